//! One report run, from input files to the HTML document

use std::path::PathBuf;

use log::{info, warn};
use ndarray::{Array2, Axis};

use crate::config::ReportConfig;
use crate::data::{align_samples, DESeqDataSet};
use crate::error::{ReportError, Result};
use crate::explore::{
    center_rows, cluster_order, pca, row_distances, sample_distances, top_by_mean, top_by_variance,
};
use crate::io::{read_count_matrix, read_sample_design, write_results, Contrast, DESeqResults};
use crate::plot::{
    render_heatmap, render_ma, render_pca, render_pvalue_histogram, render_volcano, Annotation, ColorScale,
    Heatmap,
};
use crate::report::Report;
use crate::transform::{vst, VstResult};

/// What a finished run produced
#[derive(Debug)]
pub struct ReportOutcome {
    /// Results ordered by adjusted p-value
    pub results: DESeqResults,
    pub vst: VstResult,
    pub n_figures: usize,
    pub output: PathBuf,
}

/// Warn about every input path that does not exist and return them
pub fn check_inputs(config: &ReportConfig) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for (what, path) in [("count file", &config.counts), ("design file", &config.design)] {
        if !path.exists() {
            warn!("{} not found: {}", what, path.display());
            missing.push(path.clone());
        }
    }
    missing
}

/// Contrast from the configured levels, or `None` for the default
fn configured_contrast(config: &ReportConfig) -> Option<Contrast> {
    match (&config.numerator, &config.denominator) {
        (Some(num), Some(den)) => Some(Contrast::new(&config.condition_column, num, den)),
        _ => None,
    }
}

/// Run the whole report and write it to `config.output`
pub fn run_report(config: &ReportConfig) -> Result<ReportOutcome> {
    config.validate()?;
    check_inputs(config);

    info!("Reading counts from {}", config.counts.display());
    let counts = read_count_matrix(&config.counts)?;
    info!("Reading sample design from {}", config.design.display());
    let design = read_sample_design(&config.design, config.sample_column.as_deref(), &config.condition_column)?;

    let counts = align_samples(&counts, &design)?;
    if counts.sample_ids() != design.sample_ids() {
        return Err(ReportError::InvalidDesign {
            reason: "sample IDs differ after alignment".to_string(),
        });
    }

    let mut dds = DESeqDataSet::new(counts, design, &config.condition_column, config.reference_level.as_deref())?;
    info!("Fitting {} genes x {} samples", dds.n_genes(), dds.n_samples());
    crate::run_deseq(&mut dds)?;

    let results = crate::testing::results(&dds, configured_contrast(config), config.alpha)?.order_by_padj();
    info!("{}", results.contrast);
    for line in results.summary(config.alpha).to_string().lines() {
        info!("{}", line);
    }
    if let Some(path) = &config.results {
        write_results(path, &results)?;
    }

    let transformed = vst(&dds)?;

    let mut report = Report::new(&config.title);
    report
        .add_input("count matrix", &config.counts.display().to_string())
        .add_input("sample design", &config.design.display().to_string())
        .add_input(
            "samples",
            &format!("{} ({})", dds.n_samples(), dds.counts().sample_ids().join(", ")),
        )
        .add_input("genes", &dds.n_genes().to_string())
        .add_input("design", &format!("~ {}", config.condition_column))
        .add_input(
            "size factors",
            &dds.size_factors()
                .map(|sf| sf.iter().map(|s| format!("{:.3}", s)).collect::<Vec<_>>().join(", "))
                .unwrap_or_default(),
        )
        .set_summary(&results, config.alpha)
        .set_top_genes(&results, config.top_genes);

    render_figures(config, &dds, &results, &transformed, &mut report)?;
    report.write(&config.output)?;

    Ok(ReportOutcome {
        results,
        vst: transformed,
        n_figures: report.n_figures(),
        output: config.output.clone(),
    })
}

fn render_figures(
    config: &ReportConfig,
    dds: &DESeqDataSet,
    results: &DESeqResults,
    transformed: &VstResult,
    report: &mut Report,
) -> Result<()> {
    let condition = dds
        .sample_metadata()
        .column(&config.condition_column)
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    let annotation = Annotation {
        name: config.condition_column.clone(),
        values: condition.clone(),
    };
    let normalized = dds.normalized_counts().ok_or_else(|| ReportError::InvalidInput {
        reason: "normalized counts are missing".to_string(),
    })?;
    let n = config.top_genes;

    let rows = top_by_mean(normalized, n);
    let svg = gene_heatmap(
        "Most highly expressed genes",
        transformed,
        &rows,
        &annotation,
        ColorScale::Diverging,
        false,
    )?;
    report.add_figure(
        "Expression heatmap",
        &format!("VST values of the {} genes with the highest mean normalized count.", rows.len()),
        svg,
    );

    report.add_figure(
        "Sample distances",
        "Euclidean distances between samples on the VST matrix, clustered with complete linkage.",
        distance_heatmap(transformed)?,
    );

    let svg = match pca(&transformed.data, config.pca_ntop) {
        Ok(result) => render_pca(&result, &condition, &config.condition_column, "PCA")?,
        Err(e) => {
            warn!("PCA skipped: {}", e);
            crate::plot::placeholder("PCA", "not enough data for PCA")?
        }
    };
    report.add_figure(
        "PCA",
        &format!("First two principal components of the {} most variable VST genes.", config.pca_ntop),
        svg,
    );

    report.add_figure(
        "p-value histogram",
        "Wald test p-values of genes with a mean normalized count above 1.",
        render_pvalue_histogram(results)?,
    );
    report.add_figure(
        "MA plot",
        &format!(
            "Log2 fold change against mean normalized count; genes with padj < {} in red.",
            config.highlight_padj
        ),
        render_ma(results, config.highlight_padj, config.ma_ylim)?,
    );
    report.add_figure(
        "Volcano plot",
        &format!("Genes with padj < {} in red.", config.highlight_padj),
        render_volcano(results, config.highlight_padj)?,
    );

    let rows = top_by_variance(&transformed.data, n);
    let svg = gene_heatmap(
        "Most variable genes",
        transformed,
        &rows,
        &annotation,
        ColorScale::DivergingCentered,
        true,
    )?;
    report.add_figure(
        "High-variance genes",
        &format!(
            "The {} genes with the highest VST variance, centred on their means and clustered.",
            rows.len()
        ),
        svg,
    );
    Ok(())
}

/// Heatmap of the VST rows `rows`, optionally centred and clustered on both axes
fn gene_heatmap(
    title: &str,
    transformed: &VstResult,
    rows: &[usize],
    annotation: &Annotation,
    scale: ColorScale,
    clustered: bool,
) -> Result<String> {
    let mut values = transformed.data.select(Axis(0), rows);
    let mut row_order: Vec<usize> = (0..rows.len()).collect();
    let mut col_order: Vec<usize> = (0..transformed.n_samples()).collect();
    if clustered {
        values = center_rows(&values);
        row_order = cluster_order(&row_distances(&values));
        col_order = cluster_order(&sample_distances(&values));
    }
    let values = reorder(&values, &row_order, &col_order);
    let row_labels: Vec<String> = row_order.iter().map(|&i| transformed.gene_ids[rows[i]].clone()).collect();
    let col_labels = pick(&transformed.sample_ids, &col_order);
    let annotation = Annotation {
        name: annotation.name.clone(),
        values: pick(&annotation.values, &col_order),
    };

    render_heatmap(&Heatmap {
        title,
        values: &values,
        row_labels: &row_labels,
        col_labels: &col_labels,
        annotation: Some(&annotation),
        scale,
        key_label: if clustered { "centred VST" } else { "VST" },
    })
}

fn distance_heatmap(transformed: &VstResult) -> Result<String> {
    let distances = sample_distances(&transformed.data);
    let order = cluster_order(&distances);
    let values = reorder(&distances, &order, &order);
    let labels = pick(&transformed.sample_ids, &order);
    render_heatmap(&Heatmap {
        title: "Sample-to-sample distances",
        values: &values,
        row_labels: &labels,
        col_labels: &labels,
        annotation: None,
        scale: ColorScale::Sequential,
        key_label: "distance",
    })
}

fn reorder(matrix: &Array2<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
    matrix.select(Axis(0), rows).select(Axis(1), cols)
}

fn pick(values: &[String], order: &[usize]) -> Vec<String> {
    order.iter().filter_map(|&i| values.get(i).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_inputs_reports_missing_files() {
        let config = ReportConfig {
            counts: PathBuf::from("/nonexistent/counts.tsv.gz"),
            design: PathBuf::from("/nonexistent/design.csv"),
            ..Default::default()
        };
        assert_eq!(check_inputs(&config).len(), 2);
    }

    #[test]
    fn test_missing_counts_is_an_error() {
        let config = ReportConfig {
            counts: PathBuf::from("/nonexistent/counts.tsv.gz"),
            ..Default::default()
        };
        assert!(matches!(run_report(&config), Err(ReportError::MissingInput { .. })));
    }

    #[test]
    fn test_configured_contrast() {
        let mut config = ReportConfig::default();
        assert!(configured_contrast(&config).is_none());
        config.numerator = Some("trt".to_string());
        config.denominator = Some("ctl".to_string());
        assert_eq!(configured_contrast(&config), Some(Contrast::new("condition", "trt", "ctl")));
    }

    #[test]
    fn test_reorder_and_pick() {
        let m = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(reorder(&m, &[1, 0], &[1, 0]), array![[4.0, 3.0], [2.0, 1.0]]);
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pick(&labels, &[1, 0]), vec!["b", "a"]);
    }
}
