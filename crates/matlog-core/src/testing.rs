//! An in-memory [`MatBackend`] for tests and examples that need a working
//! backend without linking an HDF5 runtime or touching disk.
//!
//! Not test-gated (no `#[cfg(test)]`): `tests/integration_tests.rs` and
//! downstream crates both need to reach it, mirroring how a library ships a
//! small always-available test double rather than only an internal one.

use crate::backend::MatBackend;
use crate::error::BackendError;
use crate::mat_data::{Mat64, MatData};

/// The axis a numeric variable grows along, fixed by its first
/// `append_numeric` call (see the open question recorded in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrowthAxis {
    /// `slices == 1` on the first call: grow the column count.
    Columns,
    /// `slices > 1` on the first call: grow the slice count, `cols` fixed.
    Slices,
}

struct NumericVar {
    rows: usize,
    cols: usize,
    axis: GrowthAxis,
    total: usize,
    data: Vec<f64>,
}

/// Simple append-only in-memory store, keyed by insertion order so
/// `list_names` is deterministic.
#[derive(Default)]
pub struct MemoryBackend {
    numeric: Vec<(String, NumericVar)>,
    structs: Vec<(String, MatData)>,
    open: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn numeric_mut(&mut self, name: &str) -> Option<&mut NumericVar> {
        self.numeric.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl MatBackend for MemoryBackend {
    fn init(&mut self, _path: &str, _compression_enabled: bool) -> Result<(), BackendError> {
        self.numeric.clear();
        self.structs.clear();
        self.open = true;
        Ok(())
    }

    fn open(&mut self, _path: &str, _read_write: bool) -> Result<(), BackendError> {
        self.open = true;
        Ok(())
    }

    fn list_names(&self) -> Result<Vec<String>, BackendError> {
        let mut names: Vec<String> = self.numeric.iter().map(|(n, _)| n.clone()).collect();
        names.extend(self.structs.iter().map(|(n, _)| n.clone()));
        Ok(names)
    }

    fn append_numeric(
        &mut self,
        name: &str,
        data: &[f64],
        rows: usize,
        cols: usize,
        slices: usize,
    ) -> Result<(), BackendError> {
        if let Some(existing) = self.numeric_mut(name) {
            if existing.rows != rows {
                return Err(BackendError::ShapeMismatch {
                    name: name.to_string(),
                    existing_rows: existing.rows,
                    existing_cols: existing.cols,
                    rows,
                    cols,
                });
            }
            if existing.axis == GrowthAxis::Slices && existing.cols != cols {
                return Err(BackendError::ShapeMismatch {
                    name: name.to_string(),
                    existing_rows: existing.rows,
                    existing_cols: existing.cols,
                    rows,
                    cols,
                });
            }
            existing.data.extend_from_slice(data);
            existing.total += match existing.axis {
                GrowthAxis::Columns => cols,
                GrowthAxis::Slices => slices,
            };
            return Ok(());
        }

        let axis = if slices == 1 { GrowthAxis::Columns } else { GrowthAxis::Slices };
        let total = match axis {
            GrowthAxis::Columns => cols,
            GrowthAxis::Slices => slices,
        };
        self.numeric.push((
            name.to_string(),
            NumericVar {
                rows,
                cols,
                axis,
                total,
                data: data.to_vec(),
            },
        ));
        Ok(())
    }

    fn write_struct(&mut self, name: &str, value: &MatData) -> Result<(), BackendError> {
        match self.structs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.clone(),
            None => self.structs.push((name.to_string(), value.clone())),
        }
        Ok(())
    }

    fn read_numeric(&self, name: &str) -> Result<(Mat64, usize), BackendError> {
        let (_, var) = self
            .numeric
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| BackendError::MissingVariable(name.to_string()))?;

        match var.axis {
            GrowthAxis::Columns => Ok((Mat64::new(var.rows, var.total, var.data.clone()), 1)),
            GrowthAxis::Slices => Ok((Mat64::new(var.rows, var.cols, var.data.clone()), var.total)),
        }
    }

    fn read_struct(&self, name: &str) -> Result<MatData, BackendError> {
        self.structs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| BackendError::MissingVariable(name.to_string()))
    }

    fn delete_variable(&mut self, name: &str) -> Result<(), BackendError> {
        self.numeric.retain(|(n, _)| n != name);
        self.structs.retain(|(n, _)| n != name);
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_variable_grows_column_count_across_calls() {
        let mut backend = MemoryBackend::new();
        backend.append_numeric("v", &[1.0, 2.0, 3.0], 3, 1, 1).unwrap();
        backend.append_numeric("v", &[4.0, 5.0, 6.0], 3, 1, 1).unwrap();
        let (mat, slices) = backend.read_numeric("v").unwrap();
        assert_eq!((mat.rows(), mat.cols(), slices), (3, 2, 1));
        assert_eq!(mat.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn matrix_variable_grows_slice_count_across_calls() {
        let mut backend = MemoryBackend::new();
        let two_slices: Vec<f64> = Mat64::identity(2)
            .as_slice()
            .iter()
            .chain(Mat64::identity(2).as_slice())
            .copied()
            .collect();
        backend.append_numeric("m", &two_slices, 2, 2, 2).unwrap();
        backend.append_numeric("m", Mat64::identity(2).as_slice(), 2, 2, 1).unwrap();
        let (mat, slices) = backend.read_numeric("m").unwrap();
        assert_eq!((mat.rows(), mat.cols(), slices), (2, 2, 3));
    }

    #[test]
    fn unknown_variable_is_missing() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.read_numeric("nope"),
            Err(BackendError::MissingVariable(_))
        ));
    }
}
