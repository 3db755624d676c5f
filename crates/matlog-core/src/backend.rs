use crate::error::BackendError;
use crate::mat_data::MatData;

/// The persistence plug-point: turns numeric blocks and [`MatData`] values
/// into bytes on disk. Not implemented by this crate — a MAT v7.3/HDF5
/// backed implementation lives in the `matlog-backend` crate; an in-memory
/// implementation for tests lives in [`crate::testing`].
///
/// All methods are called from the consumer (flush) thread only; a backend
/// never needs to be `Sync` with respect to the producer.
pub trait MatBackend: Send {
    /// Creates/truncates the file at `path`.
    fn init(&mut self, path: &str, compression_enabled: bool) -> Result<(), BackendError>;

    /// Opens an existing file, read-write or read-only.
    fn open(&mut self, path: &str, read_write: bool) -> Result<(), BackendError>;

    /// Lists the top-level variable names currently in the file.
    fn list_names(&self) -> Result<Vec<String>, BackendError>;

    /// Appends a block of samples to a numeric variable, creating it on the
    /// first call. Appends along axis 2 (columns) if `slices == 1`,
    /// otherwise along axis 3 (slices). `data` is `rows * cols * slices`
    /// column-major `f64`s.
    fn append_numeric(
        &mut self,
        name: &str,
        data: &[f64],
        rows: usize,
        cols: usize,
        slices: usize,
    ) -> Result<(), BackendError>;

    /// Writes a structured value atomically, replacing any existing value
    /// under `name`.
    fn write_struct(&mut self, name: &str, value: &MatData) -> Result<(), BackendError>;

    /// Reads a numeric variable back as a dense matrix plus its slice count.
    fn read_numeric(&self, name: &str) -> Result<(crate::mat_data::Mat64, usize), BackendError>;

    /// Reads a structured variable back.
    fn read_struct(&self, name: &str) -> Result<MatData, BackendError>;

    /// Deletes a top-level variable.
    fn delete_variable(&mut self, name: &str) -> Result<(), BackendError>;

    /// Flushes and closes the file.
    fn close(&mut self) -> Result<(), BackendError>;
}

/// A backend that discards everything it is given. Useful for isolating
/// producer/consumer buffering overhead from I/O cost in benchmarks.
#[derive(Debug, Default)]
pub struct NullBackend {
    names: Vec<String>,
}

impl MatBackend for NullBackend {
    fn init(&mut self, _path: &str, _compression_enabled: bool) -> Result<(), BackendError> {
        Ok(())
    }

    fn open(&mut self, _path: &str, _read_write: bool) -> Result<(), BackendError> {
        Ok(())
    }

    fn list_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.names.clone())
    }

    fn append_numeric(
        &mut self,
        name: &str,
        _data: &[f64],
        _rows: usize,
        _cols: usize,
        _slices: usize,
    ) -> Result<(), BackendError> {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    fn write_struct(&mut self, name: &str, _value: &MatData) -> Result<(), BackendError> {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    fn read_numeric(&self, name: &str) -> Result<(crate::mat_data::Mat64, usize), BackendError> {
        Err(BackendError::MissingVariable(name.to_string()))
    }

    fn read_struct(&self, name: &str) -> Result<MatData, BackendError> {
        Err(BackendError::MissingVariable(name.to_string()))
    }

    fn delete_variable(&mut self, name: &str) -> Result<(), BackendError> {
        self.names.retain(|n| n != name);
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
