//! Report configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Settings for one report run. Every field has a default, so a JSON file only
/// needs the fields it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Gzip-compressed, tab-separated gene x sample counts
    pub counts: PathBuf,
    /// Comma-separated sample design
    pub design: PathBuf,
    pub output: PathBuf,
    /// Optional tab-separated results table
    pub results: Option<PathBuf>,
    /// Design column holding sample IDs; the first column when unset
    pub sample_column: Option<String>,
    pub condition_column: String,
    pub numerator: Option<String>,
    pub denominator: Option<String>,
    pub reference_level: Option<String>,
    /// Significance level for independent filtering and the summary
    pub alpha: f64,
    /// Adjusted p-value below which genes are highlighted in plots
    pub highlight_padj: f64,
    /// Genes in each gene heatmap
    pub top_genes: usize,
    /// Most variable genes used for PCA
    pub pca_ntop: usize,
    /// y-axis limit of the MA plot
    pub ma_ylim: f64,
    /// Worker threads; 0 lets rayon decide
    pub threads: usize,
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            counts: PathBuf::from("counts.tsv.gz"),
            design: PathBuf::from("design.csv"),
            output: PathBuf::from("report.html"),
            results: None,
            sample_column: None,
            condition_column: "condition".to_string(),
            numerator: None,
            denominator: None,
            reference_level: None,
            alpha: 0.1,
            highlight_padj: 0.01,
            top_genes: 20,
            pca_ntop: 500,
            ma_ylim: 2.0,
            threads: 0,
            title: "Differential expression report".to_string(),
        }
    }
}

impl ReportConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReportError::MissingInput {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(ReportError::InvalidConfig { reason });
        for (name, value) in [("alpha", self.alpha), ("highlight_padj", self.highlight_padj)] {
            if !(value > 0.0 && value < 1.0) {
                return invalid(format!("{} must be in (0, 1), got {}", name, value));
            }
        }
        if self.top_genes == 0 {
            return invalid("top_genes must be positive".to_string());
        }
        if self.pca_ntop < 2 {
            return invalid(format!("pca_ntop must be at least 2, got {}", self.pca_ntop));
        }
        if !(self.ma_ylim > 0.0 && self.ma_ylim.is_finite()) {
            return invalid(format!("ma_ylim must be positive, got {}", self.ma_ylim));
        }
        if self.condition_column.is_empty() {
            return invalid("condition_column must not be empty".to_string());
        }
        if self.numerator.is_some() != self.denominator.is_some() {
            return invalid("numerator and denominator must be given together".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.highlight_padj, 0.01);
        assert_eq!(config.counts, PathBuf::from("counts.tsv.gz"));
    }

    #[test]
    fn test_partial_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"condition_column": "status", "top_genes": 30}}"#).unwrap();
        let config = ReportConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.condition_column, "status");
        assert_eq!(config.top_genes, 30);
        assert_eq!(config.alpha, 0.1);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ReportConfig {
            numerator: Some("tumor".to_string()),
            denominator: Some("normal".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: ReportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_alpha = ReportConfig { alpha: 1.5, ..Default::default() };
        assert!(matches!(bad_alpha.validate(), Err(ReportError::InvalidConfig { .. })));
        let half_contrast = ReportConfig {
            numerator: Some("b".to_string()),
            ..Default::default()
        };
        assert!(half_contrast.validate().is_err());
    }
}
