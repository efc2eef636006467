//! DESeqDataSet - counts, sample design, model formula and fitted state

use ndarray::{Array1, Array2, Array3};

use super::{CountMatrix, SampleMetadata};
use crate::error::{ReportError, Result};
use crate::glm::{create_design_matrix, intercept_design, DesignInfo};

/// Counts and design bundled with the model `~ condition`, plus the state
/// accumulated by size factor, dispersion and GLM estimation
#[derive(Debug, Clone)]
pub struct DESeqDataSet {
    counts: CountMatrix,
    sample_metadata: SampleMetadata,
    design_matrix: Array2<f64>,
    design_info: DesignInfo,

    size_factors: Option<Array1<f64>>,
    normalized_counts: Option<Array2<f64>>,

    gene_dispersions: Option<Array1<f64>>,
    trended_dispersions: Option<Array1<f64>>,
    map_dispersions: Option<Array1<f64>>,
    /// Fitted means from the gene-wise dispersion step
    mu: Option<Array2<f64>>,
    /// `(asymptDisp, extraPois)`: dispersion(mean) = asymptDisp + extraPois / mean
    dispersion_function: Option<(f64, f64)>,
    dispersion_prior_var: Option<f64>,
    dispersion_outliers: Option<Vec<bool>>,

    coefficients: Option<Array2<f64>>,
    standard_errors: Option<Array2<f64>>,
    /// n_genes x n_coefs x n_coefs
    covariances: Option<Array3<f64>>,
    hat_diagonals: Option<Array2<f64>>,
    fitted_mu: Option<Array2<f64>>,
    converged: Option<Vec<bool>>,
}

impl DESeqDataSet {
    /// Build the dataset for `~ condition`.
    ///
    /// Count columns and design rows must already be aligned
    /// (see [`crate::data::align_samples`]).
    pub fn new(
        counts: CountMatrix,
        sample_metadata: SampleMetadata,
        condition: &str,
        reference_level: Option<&str>,
    ) -> Result<Self> {
        if counts.sample_ids() != sample_metadata.sample_ids() {
            return Err(ReportError::InvalidDesign {
                reason: "sample IDs in counts and design are not aligned".to_string(),
            });
        }
        let (design_matrix, design_info) =
            create_design_matrix(&sample_metadata, condition, reference_level)?;
        log::info!(
            "Design: ~ {} (levels: {}, reference: {})",
            condition,
            design_info.levels.join(", "),
            design_info.reference_level.as_deref().unwrap_or("")
        );
        Ok(Self::with_design(counts, sample_metadata, design_matrix, design_info))
    }

    /// Dataset with the intercept-only design `~ 1`, used for blind transforms
    pub fn intercept_only(counts: CountMatrix) -> Result<Self> {
        let sample_metadata = SampleMetadata::new(counts.sample_ids().to_vec())?;
        let (design_matrix, design_info) = intercept_design(counts.n_samples());
        Ok(Self::with_design(counts, sample_metadata, design_matrix, design_info))
    }

    fn with_design(
        counts: CountMatrix,
        sample_metadata: SampleMetadata,
        design_matrix: Array2<f64>,
        design_info: DesignInfo,
    ) -> Self {
        Self {
            counts,
            sample_metadata,
            design_matrix,
            design_info,
            size_factors: None,
            normalized_counts: None,
            gene_dispersions: None,
            trended_dispersions: None,
            map_dispersions: None,
            mu: None,
            dispersion_function: None,
            dispersion_prior_var: None,
            dispersion_outliers: None,
            coefficients: None,
            standard_errors: None,
            covariances: None,
            hat_diagonals: None,
            fitted_mu: None,
            converged: None,
        }
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn sample_metadata(&self) -> &SampleMetadata {
        &self.sample_metadata
    }

    pub fn design_matrix(&self) -> &Array2<f64> {
        &self.design_matrix
    }

    pub fn design_info(&self) -> &DesignInfo {
        &self.design_info
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn size_factors(&self) -> Option<&Array1<f64>> {
        self.size_factors.as_ref()
    }

    pub fn normalized_counts(&self) -> Option<&Array2<f64>> {
        self.normalized_counts.as_ref()
    }

    pub fn gene_dispersions(&self) -> Option<&Array1<f64>> {
        self.gene_dispersions.as_ref()
    }

    pub fn trended_dispersions(&self) -> Option<&Array1<f64>> {
        self.trended_dispersions.as_ref()
    }

    pub fn map_dispersions(&self) -> Option<&Array1<f64>> {
        self.map_dispersions.as_ref()
    }

    /// Final dispersions: MAP when available, else gene-wise
    pub fn dispersions(&self) -> Option<&Array1<f64>> {
        self.map_dispersions
            .as_ref()
            .or(self.gene_dispersions.as_ref())
    }

    pub fn mu(&self) -> Option<&Array2<f64>> {
        self.mu.as_ref()
    }

    pub fn dispersion_function(&self) -> Option<(f64, f64)> {
        self.dispersion_function
    }

    pub fn dispersion_prior_var(&self) -> Option<f64> {
        self.dispersion_prior_var
    }

    pub fn dispersion_outliers(&self) -> Option<&Vec<bool>> {
        self.dispersion_outliers.as_ref()
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    pub fn standard_errors(&self) -> Option<&Array2<f64>> {
        self.standard_errors.as_ref()
    }

    pub fn covariances(&self) -> Option<&Array3<f64>> {
        self.covariances.as_ref()
    }

    pub fn hat_diagonals(&self) -> Option<&Array2<f64>> {
        self.hat_diagonals.as_ref()
    }

    /// Means from the final GLM fit
    pub fn fitted_mu(&self) -> Option<&Array2<f64>> {
        self.fitted_mu.as_ref()
    }

    pub fn converged(&self) -> Option<&Vec<bool>> {
        self.converged.as_ref()
    }

    pub fn has_size_factors(&self) -> bool {
        self.size_factors.is_some()
    }

    /// Set size factors and recompute normalized counts
    pub fn set_size_factors(&mut self, size_factors: Array1<f64>) -> Result<()> {
        self.check_len(size_factors.len(), self.n_samples(), "size factors")?;
        if size_factors.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(ReportError::SizeFactorFailed {
                reason: "size factors must be positive and finite".to_string(),
            });
        }
        let mut normalized = self.counts.counts().to_owned();
        for (j, &sf) in size_factors.iter().enumerate() {
            normalized.column_mut(j).mapv_inplace(|c| c / sf);
        }
        self.normalized_counts = Some(normalized);
        self.size_factors = Some(size_factors);
        Ok(())
    }

    pub fn set_gene_dispersions(&mut self, dispersions: Array1<f64>) -> Result<()> {
        self.check_len(dispersions.len(), self.n_genes(), "gene-wise dispersions")?;
        self.gene_dispersions = Some(dispersions);
        Ok(())
    }

    pub fn set_trended_dispersions(&mut self, dispersions: Array1<f64>) -> Result<()> {
        self.check_len(dispersions.len(), self.n_genes(), "trended dispersions")?;
        self.trended_dispersions = Some(dispersions);
        Ok(())
    }

    pub fn set_map_dispersions(&mut self, dispersions: Array1<f64>) -> Result<()> {
        self.check_len(dispersions.len(), self.n_genes(), "MAP dispersions")?;
        self.map_dispersions = Some(dispersions);
        Ok(())
    }

    pub fn set_mu(&mut self, mu: Array2<f64>) -> Result<()> {
        self.check_shape(mu.dim(), "mu")?;
        self.mu = Some(mu);
        Ok(())
    }

    pub fn set_dispersion_function(&mut self, asympt_disp: f64, extra_pois: f64) {
        self.dispersion_function = Some((asympt_disp, extra_pois));
    }

    pub fn set_dispersion_prior_var(&mut self, var: f64) {
        self.dispersion_prior_var = Some(var);
    }

    pub fn set_dispersion_outliers(&mut self, outliers: Vec<bool>) -> Result<()> {
        self.check_len(outliers.len(), self.n_genes(), "dispersion outlier flags")?;
        self.dispersion_outliers = Some(outliers);
        Ok(())
    }

    /// Store the per-gene GLM fit
    pub fn set_glm_fit(
        &mut self,
        coefficients: Array2<f64>,
        standard_errors: Array2<f64>,
        covariances: Array3<f64>,
        hat_diagonals: Array2<f64>,
        fitted_mu: Array2<f64>,
        converged: Vec<bool>,
    ) -> Result<()> {
        let coef_shape = (self.n_genes(), self.design_info.n_coefs());
        for (name, dim) in [("coefficients", coefficients.dim()), ("standard errors", standard_errors.dim())] {
            if dim != coef_shape {
                return Err(ReportError::DimensionMismatch {
                    expected: format!("{:?} {}", coef_shape, name),
                    got: format!("{:?}", dim),
                });
            }
        }
        self.check_shape(hat_diagonals.dim(), "hat diagonals")?;
        self.check_shape(fitted_mu.dim(), "fitted mu")?;
        self.check_len(converged.len(), self.n_genes(), "convergence flags")?;
        self.check_len(covariances.dim().0, self.n_genes(), "covariance matrices")?;

        self.coefficients = Some(coefficients);
        self.standard_errors = Some(standard_errors);
        self.covariances = Some(covariances);
        self.hat_diagonals = Some(hat_diagonals);
        self.fitted_mu = Some(fitted_mu);
        self.converged = Some(converged);
        Ok(())
    }

    fn check_len(&self, got: usize, expected: usize, what: &str) -> Result<()> {
        if got != expected {
            return Err(ReportError::DimensionMismatch {
                expected: format!("{} {}", expected, what),
                got: format!("{}", got),
            });
        }
        Ok(())
    }

    fn check_shape(&self, dim: (usize, usize), what: &str) -> Result<()> {
        let expected = (self.n_genes(), self.n_samples());
        if dim != expected {
            return Err(ReportError::DimensionMismatch {
                expected: format!("{:?} {}", expected, what),
                got: format!("{:?}", dim),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dataset() -> DESeqDataSet {
        let counts = CountMatrix::new(
            array![[10.0, 20.0, 30.0, 40.0], [5.0, 10.0, 15.0, 20.0]],
            vec!["g1".into(), "g2".into()],
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        )
        .unwrap();
        let mut meta = SampleMetadata::new(counts.sample_ids().to_vec()).unwrap();
        meta.add_column(
            "condition",
            vec!["ctl".into(), "ctl".into(), "trt".into(), "trt".into()],
        )
        .unwrap();
        DESeqDataSet::new(counts, meta, "condition", None).unwrap()
    }

    #[test]
    fn test_new_builds_design() {
        let dds = dataset();
        assert_eq!(dds.design_matrix().dim(), (4, 2));
        assert_eq!(dds.design_info().coef_names[1], "condition_trt_vs_ctl");
    }

    #[test]
    fn test_size_factors_normalize() {
        let mut dds = dataset();
        dds.set_size_factors(array![1.0, 2.0, 3.0, 4.0]).unwrap();
        let norm = dds.normalized_counts().unwrap();
        assert_eq!(norm.row(0).to_vec(), vec![10.0, 10.0, 10.0, 10.0]);
        assert!(dds.set_size_factors(array![1.0, 2.0]).is_err());
        assert!(dds.set_size_factors(array![1.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_misaligned_rejected() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0, 3.0]],
            vec!["g1".into()],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let mut meta = SampleMetadata::new(vec!["c".into(), "b".into(), "a".into()]).unwrap();
        meta.add_column("condition", vec!["x".into(), "y".into(), "x".into()]).unwrap();
        assert!(DESeqDataSet::new(counts, meta, "condition", None).is_err());
    }

    #[test]
    fn test_dispersions_prefers_map() {
        let mut dds = dataset();
        dds.set_gene_dispersions(array![0.1, 0.2]).unwrap();
        assert_eq!(dds.dispersions().unwrap()[1], 0.2);
        dds.set_map_dispersions(array![0.3, 0.4]).unwrap();
        assert_eq!(dds.dispersions().unwrap()[1], 0.4);
    }

    #[test]
    fn test_intercept_only() {
        let dds = dataset();
        let blind = DESeqDataSet::intercept_only(dds.counts().clone()).unwrap();
        assert_eq!(blind.design_matrix().dim(), (4, 1));
        assert!(blind.design_info().variable.is_none());
    }
}
