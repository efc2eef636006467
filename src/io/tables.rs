//! Reading count and design tables, writing results tables

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use ndarray::Array2;

use super::results::DESeqResults;
use crate::data::{CountMatrix, SampleMetadata};
use crate::error::{ReportError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn open_input(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(ReportError::MissingInput {
            path: path.display().to_string(),
        });
    }
    Ok(File::open(path)?)
}

/// Whole file as text, gunzipped when it starts with the gzip magic bytes
fn read_text(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(open_input(path)?);
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    if raw.starts_with(&GZIP_MAGIC) {
        log::debug!("{} is gzip-compressed", path.display());
        let mut text = String::new();
        MultiGzDecoder::new(raw.as_slice()).read_to_string(&mut text)?;
        Ok(text)
    } else {
        String::from_utf8(raw).map_err(|e| ReportError::InvalidInput {
            reason: format!("{} is not valid UTF-8: {}", path.display(), e),
        })
    }
}

/// Tab unless the header line has no tabs
fn detect_delimiter(text: &str) -> u8 {
    match text.lines().next() {
        Some(header) if !header.contains('\t') && header.contains(',') => b',',
        _ => b'\t',
    }
}

/// Read a gene x sample count matrix.
///
/// The header row holds the sample IDs after a leading gene-ID column; every
/// other row is a gene ID followed by one count per sample. A header one field
/// shorter than the rows (as R's `write.table` writes it) names samples only.
/// Tab-separated, optionally gzip-compressed.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(&text))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers()?.clone();
    let mut sample_ids: Vec<String> = Vec::new();
    let mut gene_ids = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if gene_ids.is_empty() {
            sample_ids = if record.len() == header.len() + 1 {
                log::debug!("{} has no gene ID column header", path.display());
                header.iter().map(str::to_string).collect()
            } else {
                header.iter().skip(1).map(str::to_string).collect()
            };
            if sample_ids.is_empty() {
                return Err(ReportError::InvalidCountMatrix {
                    reason: "header needs a gene ID column and at least one sample".to_string(),
                });
            }
        }
        let gene = record.get(0).unwrap_or_default();
        if record.len() != sample_ids.len() + 1 {
            return Err(ReportError::InvalidCountMatrix {
                reason: format!(
                    "gene '{}' has {} counts, expected {}",
                    gene,
                    record.len().saturating_sub(1),
                    sample_ids.len()
                ),
            });
        }
        gene_ids.push(gene.to_string());
        for field in record.iter().skip(1) {
            let value = field.parse::<f64>().map_err(|_| ReportError::InvalidCountMatrix {
                reason: format!("invalid count '{}' for gene '{}'", field, gene),
            })?;
            values.push(value);
        }
    }
    let n_samples = sample_ids.len();

    if gene_ids.is_empty() {
        return Err(ReportError::EmptyData {
            reason: format!("no genes found in {}", path.display()),
        });
    }
    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
        ReportError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    log::info!(
        "Read {} genes x {} samples from {}",
        gene_ids.len(),
        n_samples,
        path.display()
    );
    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read the comma-separated sample design.
///
/// Sample IDs come from `sample_column`, or from the first column when it is
/// `None`. Every other column is kept as a categorical variable; the
/// `condition_column` must be one of them.
pub fn read_sample_design<P: AsRef<Path>>(
    path: P,
    sample_column: Option<&str>,
    condition_column: &str,
) -> Result<SampleMetadata> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(open_input(path)?));

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let id_index = match sample_column {
        Some(name) => header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReportError::InvalidDesign {
                reason: format!("sample column '{}' not found in {:?}", name, header),
            })?,
        None => 0,
    };
    if !header.iter().enumerate().any(|(i, h)| i != id_index && h == condition_column) {
        return Err(ReportError::InvalidDesign {
            reason: format!("condition column '{}' not found in {:?}", condition_column, header),
        });
    }

    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); header.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            if i == id_index {
                sample_ids.push(field.to_string());
            } else {
                columns[i].push(field.to_string());
            }
        }
    }
    if sample_ids.is_empty() {
        return Err(ReportError::EmptyData {
            reason: format!("no samples found in {}", path.display()),
        });
    }

    let mut design = SampleMetadata::new(sample_ids)?;
    for (i, (name, values)) in header.iter().zip(columns).enumerate() {
        if i != id_index {
            design.add_column(name, values)?;
        }
    }
    log::info!("Read design for {} samples from {}", design.n_samples(), path.display());
    Ok(design)
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        format!("{}", value)
    }
}

/// Write the results as a tab-separated table; missing values are `NA`
pub fn write_results<P: AsRef<Path>>(path: P, results: &DESeqResults) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path.as_ref())?;
    writer.write_record([
        "gene_id",
        "baseMean",
        "log2FoldChange",
        "lfcSE",
        "stat",
        "pvalue",
        "padj",
        "dispersion",
        "maxCooks",
    ])?;
    for i in 0..results.n_genes() {
        let mut row = vec![results.gene_ids[i].clone()];
        row.extend(
            [
                results.base_means[i],
                results.log2_fold_changes[i],
                results.lfc_se[i],
                results.stat[i],
                results.pvalues[i],
                results.padj[i],
                results.dispersions[i],
                results.max_cooks[i],
            ]
            .into_iter()
            .map(format_value),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} result rows to {}", results.n_genes(), path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Contrast;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_gzip_count_matrix() {
        let file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        write!(encoder, "gene\ts1\ts2\ts3\ng1\t100\t200\t150\ng2\t50\t75\t60\n").unwrap();
        encoder.finish().unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.sample_ids(), &["s1".to_string(), "s2".to_string(), "s3".to_string()]);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_read_plain_count_matrix() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1\t2").unwrap();
        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_samples(), 2);
    }

    #[test]
    fn test_bad_count_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1\tabc").unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(ReportError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_header_without_gene_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "s1\ts2").unwrap();
        writeln!(file, "g1\t1\t2").unwrap();
        writeln!(file, "g2\t3\t4").unwrap();
        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["s1".to_string(), "s2".to_string()]);
        assert_eq!(matrix.gene_ids(), &["g1".to_string(), "g2".to_string()]);
        assert_eq!(matrix.counts()[[1, 0]], 3.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "g1\t1\t2").unwrap();
        writeln!(file, "g2\t3").unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(ReportError::InvalidCountMatrix { .. })
        ));

        let mut short = NamedTempFile::new().unwrap();
        writeln!(short, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(short, "g1\t1\t2").unwrap();
        assert!(read_count_matrix(short.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        match read_count_matrix("/nonexistent/counts.tsv.gz") {
            Err(ReportError::MissingInput { path }) => assert!(path.ends_with("counts.tsv.gz")),
            other => panic!("expected missing input, got {:?}", other),
        }
    }

    #[test]
    fn test_read_sample_design() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "batch,sample,status").unwrap();
        writeln!(file, "b1,s1,tumor").unwrap();
        writeln!(file, "b2,s2,normal").unwrap();

        let design = read_sample_design(file.path(), Some("sample"), "status").unwrap();
        assert_eq!(design.sample_ids(), &["s1".to_string(), "s2".to_string()]);
        assert_eq!(design.column("status").unwrap(), &["tumor".to_string(), "normal".to_string()]);
        assert_eq!(design.column("batch").unwrap()[1], "b2");

        assert!(read_sample_design(file.path(), Some("sample"), "condition").is_err());
    }

    #[test]
    fn test_write_results_na() {
        let mut res = DESeqResults::new(vec!["g1".to_string()], Contrast::new("c", "b", "a"));
        res.base_means[0] = 12.5;
        let file = NamedTempFile::new().unwrap();
        write_results(file.path(), &res).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("gene_id\tbaseMean"));
        assert_eq!(lines[1], "g1\t12.5\tNA\tNA\tNA\tNA\tNA\tNA\tNA");
    }
}
