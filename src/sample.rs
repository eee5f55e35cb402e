use crate::error::{ChaosError, Result};

/// Row-major table of observations with one named column per variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    names: Vec<String>,
    data: Vec<f64>,
}

impl Sample {
    pub fn with_capacity(names: Vec<String>, rows: usize) -> Result<Self> {
        if names.is_empty() {
            return Err(ChaosError::InvalidArgument {
                stage: "sample",
                reason: "a sample needs at least one column".to_string(),
            });
        }
        let data = Vec::with_capacity(rows * names.len());
        Ok(Self { names, data })
    }

    pub fn from_rows<R: AsRef<[f64]>>(names: Vec<String>, rows: &[R]) -> Result<Self> {
        let mut sample = Self::with_capacity(names, rows.len())?;
        for row in rows {
            sample.push(row.as_ref())?;
        }
        Ok(sample)
    }

    pub fn push(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "sample row",
                expected: self.dimension(),
                found: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// # Panics
    ///
    /// If `index` is not below [`Self::len`].
    pub fn row(&self, index: usize) -> &[f64] {
        let dim = self.dimension();
        &self.data[index * dim..(index + 1) * dim]
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.dimension())
    }

    /// # Panics
    ///
    /// If `index` is not below [`Self::dimension`] and the sample is not empty.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows().map(|row| row[index]).collect()
    }

    /// Row-major view of all values.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
