//! Differential expression results table

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-gene results of one contrast, columns in parallel vectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DESeqResults {
    pub gene_ids: Vec<String>,
    /// Mean of normalized counts over all samples
    pub base_means: Vec<f64>,
    pub log2_fold_changes: Vec<f64>,
    pub lfc_se: Vec<f64>,
    /// Wald statistic
    pub stat: Vec<f64>,
    pub pvalues: Vec<f64>,
    /// BH-adjusted p-values after independent filtering
    pub padj: Vec<f64>,
    /// Final (MAP) dispersion used in the fit
    pub dispersions: Vec<f64>,
    /// Largest Cook's distance over samples of well-replicated levels
    pub max_cooks: Vec<f64>,
    /// Genes whose p-value was removed by the Cook's distance filter
    pub cooks_outliers: Vec<bool>,
    /// `baseMean` cutoff chosen by independent filtering
    pub filter_threshold: Option<f64>,
    pub contrast: Contrast,
}

/// `numerator` vs `denominator` levels of `variable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contrast {
    pub variable: String,
    pub numerator: String,
    pub denominator: String,
}

impl Contrast {
    pub fn new(variable: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            variable: variable.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }
}

impl fmt::Display for Contrast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} vs {}", self.variable, self.numerator, self.denominator)
    }
}

impl DESeqResults {
    /// Results with every column missing
    pub fn new(gene_ids: Vec<String>, contrast: Contrast) -> Self {
        let n = gene_ids.len();
        Self {
            gene_ids,
            base_means: vec![f64::NAN; n],
            log2_fold_changes: vec![f64::NAN; n],
            lfc_se: vec![f64::NAN; n],
            stat: vec![f64::NAN; n],
            pvalues: vec![f64::NAN; n],
            padj: vec![f64::NAN; n],
            dispersions: vec![f64::NAN; n],
            max_cooks: vec![f64::NAN; n],
            cooks_outliers: vec![false; n],
            filter_threshold: None,
            contrast,
        }
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Rows reordered by ascending `padj`. Missing values go last and ties keep
    /// their current order.
    pub fn order_by_padj(&self) -> Self {
        let mut order: Vec<usize> = (0..self.n_genes()).collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (self.padj[a], self.padj[b]);
            match (pa.is_nan(), pb.is_nan()) {
                (false, false) => pa.partial_cmp(&pb).unwrap_or(Ordering::Equal),
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (true, true) => Ordering::Equal,
            }
        });
        self.select(&order)
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| values[i].clone()).collect()
        }
        Self {
            gene_ids: pick(&self.gene_ids, indices),
            base_means: pick(&self.base_means, indices),
            log2_fold_changes: pick(&self.log2_fold_changes, indices),
            lfc_se: pick(&self.lfc_se, indices),
            stat: pick(&self.stat, indices),
            pvalues: pick(&self.pvalues, indices),
            padj: pick(&self.padj, indices),
            dispersions: pick(&self.dispersions, indices),
            max_cooks: pick(&self.max_cooks, indices),
            cooks_outliers: pick(&self.cooks_outliers, indices),
            filter_threshold: self.filter_threshold,
            contrast: self.contrast.clone(),
        }
    }

    pub fn is_significant(&self, i: usize, threshold: f64) -> bool {
        self.padj[i] < threshold
    }

    /// IDs of genes with `padj < alpha`
    pub fn significant_genes(&self, alpha: f64) -> Vec<&str> {
        (0..self.n_genes())
            .filter(|&i| self.is_significant(i, alpha))
            .map(|i| self.gene_ids[i].as_str())
            .collect()
    }

    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        let significant: Vec<usize> = (0..self.n_genes()).filter(|&i| self.is_significant(i, alpha)).collect();
        let low_counts = match self.filter_threshold {
            Some(threshold) => (0..self.n_genes())
                .filter(|&i| self.pvalues[i].is_finite() && self.padj[i].is_nan() && self.base_means[i] < threshold)
                .count(),
            None => 0,
        };
        ResultsSummary {
            total_genes: self.n_genes(),
            nonzero_genes: self.base_means.iter().filter(|&&m| m > 0.0).count(),
            upregulated: significant.iter().filter(|&&i| self.log2_fold_changes[i] > 0.0).count(),
            downregulated: significant.iter().filter(|&&i| self.log2_fold_changes[i] < 0.0).count(),
            cooks_outliers: self.cooks_outliers.iter().filter(|&&o| o).count(),
            low_counts,
            filter_threshold: self.filter_threshold,
            alpha,
        }
    }
}

/// Gene counts behind a results table
#[derive(Debug, Clone, Serialize)]
pub struct ResultsSummary {
    pub total_genes: usize,
    /// Genes with a nonzero mean count
    pub nonzero_genes: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub cooks_outliers: usize,
    /// Genes whose adjusted p-value was dropped by independent filtering
    pub low_counts: usize,
    pub filter_threshold: Option<f64>,
    pub alpha: f64,
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |n: usize| {
            if self.nonzero_genes == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.nonzero_genes as f64
            }
        };
        writeln!(f, "out of {} with nonzero total read count", self.nonzero_genes)?;
        writeln!(f, "adjusted p-value < {}", self.alpha)?;
        writeln!(f, "LFC > 0 (up)       : {}, {:.2}%", self.upregulated, pct(self.upregulated))?;
        writeln!(f, "LFC < 0 (down)     : {}, {:.2}%", self.downregulated, pct(self.downregulated))?;
        writeln!(f, "outliers [1]       : {}, {:.2}%", self.cooks_outliers, pct(self.cooks_outliers))?;
        match self.filter_threshold {
            Some(t) => writeln!(
                f,
                "low counts [2]     : {}, {:.2}% (mean count < {:.1})",
                self.low_counts,
                pct(self.low_counts),
                t
            ),
            None => writeln!(f, "low counts [2]     : {}, {:.2}%", self.low_counts, pct(self.low_counts)),
        }
    }
}
