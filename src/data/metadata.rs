//! Sample design table

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ReportError, Result};

/// One row per sample, with named categorical columns (e.g. disease status)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    /// Column name -> value per sample, in sample order
    columns: HashMap<String, Vec<String>>,
    /// Column names in file order
    column_order: Vec<String>,
}

impl SampleMetadata {
    /// Create an empty table for the given samples; IDs must be unique
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(ReportError::InvalidDesign {
                    reason: format!("duplicate sample ID '{}'", id),
                });
            }
        }
        Ok(Self {
            sample_ids,
            columns: HashMap::new(),
            column_order: Vec::new(),
        })
    }

    /// Add or replace a categorical column
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(ReportError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.column_order.push(name.to_string());
        }
        Ok(())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Sorted unique values of a column
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        let values = self.column(name).ok_or_else(|| ReportError::InvalidDesign {
            reason: format!(
                "column '{}' not found (available: {})",
                name,
                self.column_order.join(", ")
            ),
        })?;
        let mut unique = values.to_vec();
        unique.sort();
        unique.dedup();
        Ok(unique)
    }

    /// Rows at the given indices, in the given order
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let ids = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        let mut subset = SampleMetadata::new(ids)?;
        for name in &self.column_order {
            let values = &self.columns[name];
            subset.add_column(name, sample_indices.iter().map(|&i| values[i].clone()).collect())?;
        }
        Ok(subset)
    }
}
