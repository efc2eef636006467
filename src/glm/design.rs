//! Design matrix for `~ condition` and contrast lookup

use ndarray::Array2;

use crate::data::SampleMetadata;
use crate::error::{ReportError, Result};

/// Coefficient layout of a design matrix
#[derive(Debug, Clone)]
pub struct DesignInfo {
    /// Factor in the formula; `None` for the intercept-only model `~ 1`
    pub variable: Option<String>,
    /// Names of the coefficients, `Intercept` first
    pub coef_names: Vec<String>,
    /// Reference level of the factor
    pub reference_level: Option<String>,
    /// Factor levels, reference first
    pub levels: Vec<String>,
}

impl DesignInfo {
    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }
}

/// Intercept-only design `~ 1`
pub fn intercept_design(n_samples: usize) -> (Array2<f64>, DesignInfo) {
    let info = DesignInfo {
        variable: None,
        coef_names: vec!["Intercept".to_string()],
        reference_level: None,
        levels: Vec::new(),
    };
    (Array2::from_elem((n_samples, 1), 1.0), info)
}

/// Treatment-coded design for a single categorical variable.
///
/// Column 0 is the intercept; each non-reference level gets an indicator column
/// named `{variable}_{level}_vs_{reference}`. Without an explicit reference the
/// alphabetically first level is used.
pub fn create_design_matrix(
    metadata: &SampleMetadata,
    variable: &str,
    reference: Option<&str>,
) -> Result<(Array2<f64>, DesignInfo)> {
    let values = metadata.column(variable).ok_or_else(|| ReportError::InvalidDesignMatrix {
        reason: format!("variable '{}' not found in the sample design", variable),
    })?;
    let mut levels = metadata.levels(variable)?;

    if levels.len() < 2 {
        return Err(ReportError::InvalidDesignMatrix {
            reason: format!(
                "variable '{}' needs at least two levels to test for differential expression, found {:?}",
                variable, levels
            ),
        });
    }

    if let Some(reference) = reference {
        let pos = levels.iter().position(|l| l == reference).ok_or_else(|| {
            ReportError::InvalidDesignMatrix {
                reason: format!(
                    "reference level '{}' is not a level of '{}' ({:?})",
                    reference, variable, levels
                ),
            }
        })?;
        let reference = levels.remove(pos);
        levels.insert(0, reference);
    }
    let reference_level = levels[0].clone();

    let n_samples = metadata.n_samples();
    let mut design = Array2::zeros((n_samples, levels.len()));
    for (i, value) in values.iter().enumerate() {
        design[[i, 0]] = 1.0;
        for (j, level) in levels.iter().enumerate().skip(1) {
            if value == level {
                design[[i, j]] = 1.0;
            }
        }
    }

    let mut coef_names = vec!["Intercept".to_string()];
    coef_names.extend(
        levels
            .iter()
            .skip(1)
            .map(|level| format!("{}_{}_vs_{}", variable, level, reference_level)),
    );

    check_full_rank(&design)?;

    Ok((
        design,
        DesignInfo {
            variable: Some(variable.to_string()),
            coef_names,
            reference_level: Some(reference_level),
            levels,
        },
    ))
}

/// Contrast vector over the coefficients for `numerator` vs `denominator`
pub fn contrast_vector(info: &DesignInfo, numerator: &str, denominator: &str) -> Result<Vec<f64>> {
    if numerator == denominator {
        return Err(ReportError::InvalidContrast {
            reason: format!("numerator and denominator are both '{}'", numerator),
        });
    }
    let level_index = |level: &str| {
        info.levels
            .iter()
            .position(|l| l == level)
            .ok_or_else(|| ReportError::InvalidContrast {
                reason: format!("'{}' is not a level of the design ({:?})", level, info.levels),
            })
    };
    let num = level_index(numerator)?;
    let den = level_index(denominator)?;

    // level i > 0 maps to coefficient i; the reference has no coefficient
    let mut contrast = vec![0.0; info.n_coefs()];
    if num > 0 {
        contrast[num] += 1.0;
    }
    if den > 0 {
        contrast[den] -= 1.0;
    }
    Ok(contrast)
}

/// Reject design matrices that are not of full column rank
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let (nrow, ncol) = matrix.dim();
    if nrow == 0 || ncol == 0 {
        return Err(ReportError::InvalidDesignMatrix {
            reason: "design matrix has zero rows or columns".to_string(),
        });
    }
    if nrow <= ncol {
        return Err(ReportError::InvalidDesignMatrix {
            reason: format!(
                "{} samples for {} coefficients; at least one residual degree of freedom is required",
                nrow, ncol
            ),
        });
    }
    let rank = super::to_dmatrix(matrix).rank(1e-9);
    if rank < ncol {
        return Err(ReportError::InvalidDesignMatrix {
            reason: "the model matrix is not full rank, so the model cannot be fit as specified"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn metadata(conditions: &[&str]) -> SampleMetadata {
        let ids = (0..conditions.len()).map(|i| format!("s{}", i)).collect();
        let mut meta = SampleMetadata::new(ids).unwrap();
        meta.add_column("condition", conditions.iter().map(|s| s.to_string()).collect())
            .unwrap();
        meta
    }

    #[test]
    fn test_alphabetical_reference() {
        let meta = metadata(&["tumor", "normal", "tumor", "normal"]);
        let (x, info) = create_design_matrix(&meta, "condition", None).unwrap();
        assert_eq!(x, array![[1.0, 1.0], [1.0, 0.0], [1.0, 1.0], [1.0, 0.0]]);
        assert_eq!(info.coef_names, vec!["Intercept", "condition_tumor_vs_normal"]);
        assert_eq!(info.reference_level.as_deref(), Some("normal"));
    }

    #[test]
    fn test_explicit_reference() {
        let meta = metadata(&["tumor", "normal", "tumor", "normal"]);
        let (x, info) = create_design_matrix(&meta, "condition", Some("tumor")).unwrap();
        assert_eq!(x.column(1).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(info.coef_names[1], "condition_normal_vs_tumor");
    }

    #[test]
    fn test_single_level_rejected() {
        let meta = metadata(&["a", "a", "a"]);
        assert!(create_design_matrix(&meta, "condition", None).is_err());
    }

    #[test]
    fn test_contrast_vectors() {
        let meta = metadata(&["a", "b", "c", "a", "b", "c"]);
        let (_, info) = create_design_matrix(&meta, "condition", None).unwrap();
        assert_eq!(contrast_vector(&info, "b", "a").unwrap(), vec![0.0, 1.0, 0.0]);
        assert_eq!(contrast_vector(&info, "a", "b").unwrap(), vec![0.0, -1.0, 0.0]);
        assert_eq!(contrast_vector(&info, "c", "b").unwrap(), vec![0.0, -1.0, 1.0]);
        assert!(contrast_vector(&info, "z", "a").is_err());
    }

    #[test]
    fn test_rank_deficient_rejected() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        assert!(check_full_rank(&x).is_err());
    }
}
