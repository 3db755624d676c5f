use crate::appender::Appender;
use crate::backend::MatBackend;
use crate::config::{BufferMode, LoggerConfig, OpenMode, N_BLOCKS};
use crate::error::LoggerError;
use crate::mat_data::{Mat64, MatData};
use crate::variable_buffer::VariableBuffer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A cheap, cloneable producer-side reference to one variable's buffer.
///
/// Obtained once from [`Logger::create`] and then used directly on the hot
/// path; unlike [`Logger::add`], calling through a handle never touches the
/// structural lock that guards the variable map.
#[derive(Clone)]
pub struct VariableHandle {
    buffer: Arc<VariableBuffer>,
}

impl VariableHandle {
    pub fn name(&self) -> &str {
        self.buffer.name()
    }

    pub fn rows(&self) -> usize {
        self.buffer.rows()
    }

    pub fn cols(&self) -> usize {
        self.buffer.cols()
    }

    /// Appends one `rows * cols` sample. `Ok(false)` means the variable is
    /// under back-pressure (producer/consumer mode, pool exhausted) and the
    /// sample was dropped; the caller decides how to react.
    pub fn append(&self, sample: &[f64]) -> Result<bool, crate::error::VariableError> {
        self.buffer.append(sample)
    }

    pub fn set_mode(&self, mode: BufferMode) {
        self.buffer.set_mode(mode);
    }
}

/// Tracks the appender (if any) currently managing a logger's wake-ups.
/// Shared (not owned) by every variable's block-ready callback so attaching
/// an appender after variables already exist still takes effect.
type AppenderLink = Arc<Mutex<Option<Weak<Appender>>>>;

/// Owns one backing file's worth of variables and struct values.
///
/// `append`/`add` never block on I/O: they only move samples into
/// lock-free per-variable buffers. Actual disk writes happen in
/// [`Logger::flush_available_data`], called either directly or by an
/// [`Appender`] managing this logger.
pub struct Logger {
    config: LoggerConfig,
    backend: Mutex<Box<dyn MatBackend>>,
    variables: Mutex<HashMap<String, Arc<VariableBuffer>>>,
    /// Structured values queued by `save`, off the hot numeric path; drained
    /// atomically at the start of the next `flush_available_data`.
    save_queue: Mutex<Vec<(String, MatData)>>,
    pending_bytes: Arc<AtomicU64>,
    appender_link: AppenderLink,
}

impl Logger {
    /// Opens or creates the backing file according to `config.open_mode`.
    ///
    /// A path with no extension has `.mat` appended; a path whose extension
    /// is something other than `.mat` fails construction outright.
    pub fn new(mut config: LoggerConfig, mut backend: Box<dyn MatBackend>) -> Result<Arc<Self>, LoggerError> {
        match std::path::Path::new(config.file_path()).extension() {
            None => config.file_path = format!("{}.mat", config.file_path()),
            Some(ext) if ext == "mat" => {}
            Some(_) => return Err(LoggerError::BadFilename(config.file_path().to_string())),
        }

        match config.open_mode {
            OpenMode::Create => backend.init(config.file_path(), config.enable_compression)?,
            OpenMode::OpenExisting { read_write } => backend.open(config.file_path(), read_write)?,
        }

        tracing::info!(file = config.file_path(), "logger opened");

        Ok(Arc::new(Self {
            config,
            backend: Mutex::new(backend),
            variables: Mutex::new(HashMap::new()),
            save_queue: Mutex::new(Vec::new()),
            pending_bytes: Arc::new(AtomicU64::new(0)),
            appender_link: Arc::new(Mutex::new(None)),
        }))
    }

    pub(crate) fn attach_appender(&self, appender: Weak<Appender>) {
        *self.appender_link.lock().unwrap() = Some(appender);
    }

    /// Registers a new numeric variable and returns a handle for the
    /// lock-free hot path. Fails if a variable with this name already
    /// exists. Uses `config.default_buffer_size`, clamped against
    /// `config.default_buffer_size_max_bytes` (a warning is logged if the
    /// default had to be clamped).
    pub fn create(&self, name: &str, rows: usize, cols: usize) -> Result<VariableHandle, LoggerError> {
        if rows == 0 || cols == 0 {
            return Err(LoggerError::InvalidDimensions {
                rows: rows as i64,
                cols: cols as i64,
                buffer_size: self.config.default_buffer_size as i64,
            });
        }
        let buffer_size = self.clamp_default_buffer_size(rows, cols);
        self.create_with_buffer_size(name, rows, cols, buffer_size)
    }

    /// As [`Logger::create`], but with an explicit `buffer_size` (total
    /// samples across the variable's whole pool) instead of the
    /// configuration default. An explicit value is honored as given, not
    /// reclamped against `default_buffer_size_max_bytes`.
    pub fn create_with_buffer_size(
        &self,
        name: &str,
        rows: usize,
        cols: usize,
        buffer_size: usize,
    ) -> Result<VariableHandle, LoggerError> {
        if rows == 0 || cols == 0 || buffer_size == 0 {
            return Err(LoggerError::InvalidDimensions {
                rows: rows as i64,
                cols: cols as i64,
                buffer_size: buffer_size as i64,
            });
        }

        let mut variables = self.variables.lock().unwrap();
        if variables.contains_key(name) {
            return Err(LoggerError::DuplicateVariable(name.to_string()));
        }

        // B = max(1, buffer_size / N_BLOCKS): buffer_size is the total
        // sample capacity across the variable's whole pool, divided evenly
        // across its N_BLOCKS blocks.
        let block_capacity = (buffer_size / N_BLOCKS).max(1);
        let buffer = Arc::new(VariableBuffer::new(name.to_string(), rows, cols, block_capacity));
        self.wire_block_ready(&buffer);
        variables.insert(name.to_string(), Arc::clone(&buffer));
        tracing::debug!(variable = name, rows, cols, buffer_size, block_capacity, "variable created");

        Ok(VariableHandle { buffer })
    }

    /// Clamps `config.default_buffer_size` so that
    /// `rows * cols * clamped * sizeof(f64) <= default_buffer_size_max_bytes`,
    /// logging a warning if clamping was necessary.
    fn clamp_default_buffer_size(&self, rows: usize, cols: usize) -> usize {
        let requested = self.config.default_buffer_size;
        let sample_bytes = (rows * cols * std::mem::size_of::<f64>()) as u64;
        let max_bytes = self.config.default_buffer_size_max_bytes;
        let total_bytes = sample_bytes.saturating_mul(requested as u64);

        if total_bytes <= max_bytes {
            return requested;
        }

        let clamped = (max_bytes / sample_bytes).max(1) as usize;
        tracing::warn!(
            rows,
            cols,
            requested_buffer_size = requested,
            clamped_buffer_size = clamped,
            max_bytes,
            "default_buffer_size clamped to respect default_buffer_size_max_bytes"
        );
        clamped
    }

    /// Wires a variable's block-ready callback to accumulate this logger's
    /// `pending_bytes` and wake its attached [`Appender`] once
    /// `wake_threshold_bytes` or `wake_threshold_free_ratio` is crossed —
    /// the same threshold decision §4.3 describes, kept here (per `Logger`,
    /// using that logger's own `LoggerConfig`) rather than duplicated
    /// globally across every logger sharing one appender.
    fn wire_block_ready(&self, buffer: &Arc<VariableBuffer>) {
        let pending_bytes = Arc::clone(&self.pending_bytes);
        let appender_link = Arc::clone(&self.appender_link);
        let wake_threshold_bytes = self.config.wake_threshold_bytes;
        let wake_threshold_free_ratio = self.config.wake_threshold_free_ratio;
        buffer.set_on_block_ready(Some(Box::new(move |info| {
            let total = pending_bytes.fetch_add(info.new_bytes as u64, Ordering::Relaxed) + info.new_bytes as u64;
            tracing::trace!(
                variable = info.variable_name,
                new_bytes = info.new_bytes,
                free_ratio = info.free_ratio,
                pending_bytes = total,
                "block ready"
            );

            let should_wake = total > wake_threshold_bytes || info.free_ratio < wake_threshold_free_ratio;
            if !should_wake {
                return;
            }
            pending_bytes.store(0, Ordering::Relaxed);
            if let Some(appender) = appender_link.lock().unwrap().as_ref().and_then(Weak::upgrade) {
                tracing::debug!(
                    variable = info.variable_name,
                    pending_bytes = total,
                    free_ratio = info.free_ratio,
                    "waking appender flush thread"
                );
                appender.wake();
            }
        })));
    }

    /// Convenience path: appends `sample`, creating a vector-shaped
    /// variable named `name` on first use. Acquires the structural lock on
    /// every call; prefer [`Logger::create`] plus [`VariableHandle::append`]
    /// for hot loops.
    pub fn add(&self, name: &str, sample: &[f64]) -> Result<bool, LoggerError> {
        let existing = self.variables.lock().unwrap().get(name).cloned();
        let buffer = match existing {
            Some(buffer) => buffer,
            None => {
                let handle = self.create(name, sample.len(), 1)?;
                return Ok(handle.append(sample)?);
            }
        };
        Ok(buffer.append(sample)?)
    }

    /// Enqueues a structured value (config, metadata, a scalar summary) for
    /// atomic write on the next `flush_available_data`. Off the hot numeric
    /// path: guarded by its own lock, never the variable-set lock.
    pub fn save(&self, name: &str, value: &MatData) {
        self.save_queue.lock().unwrap().push((name.to_string(), value.clone()));
    }

    pub fn set_mode(&self, name: &str, mode: BufferMode) -> Result<(), LoggerError> {
        let variables = self.variables.lock().unwrap();
        let buffer = variables
            .get(name)
            .ok_or_else(|| LoggerError::UnknownVariable(name.to_string()))?;
        buffer.set_mode(mode);
        Ok(())
    }

    pub fn list_variable_names(&self) -> Vec<String> {
        self.variables.lock().unwrap().keys().cloned().collect()
    }

    pub fn delete_variable(&self, name: &str) -> Result<(), LoggerError> {
        self.variables
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| LoggerError::UnknownVariable(name.to_string()))?;
        self.backend.lock().unwrap().delete_variable(name)?;
        Ok(())
    }

    pub fn read_numeric(&self, name: &str) -> Result<(Mat64, usize), LoggerError> {
        Ok(self.backend.lock().unwrap().read_numeric(name)?)
    }

    pub fn read_struct(&self, name: &str) -> Result<MatData, LoggerError> {
        Ok(self.backend.lock().unwrap().read_struct(name)?)
    }

    /// Drains the structured-save queue and every variable's ready blocks
    /// into the backend. Returns the number of numeric blocks written.
    /// Safe to call from any thread; an [`Appender`] calls this on its
    /// background thread once woken.
    pub fn flush_available_data(&self) -> Result<usize, LoggerError> {
        let _span = tracing::info_span!("flush_available_data", file = self.config.file_path()).entered();

        let pending_saves: Vec<(String, MatData)> = std::mem::take(&mut *self.save_queue.lock().unwrap());
        let variables: Vec<Arc<VariableBuffer>> = self.variables.lock().unwrap().values().cloned().collect();
        let mut backend = self.backend.lock().unwrap();

        for (name, value) in &pending_saves {
            backend.write_struct(name, value).map_err(|err| {
                tracing::error!(variable = name, error = %err, "backend write_struct failed");
                LoggerError::Backend(err)
            })?;
        }

        let mut blocks_written = 0usize;

        for buffer in &variables {
            while let Some(drained) = buffer.drain_one_block().map_err(|e| {
                tracing::warn!(variable = buffer.name(), error = %e, "drain rejected");
                LoggerError::Variable(e)
            })? {
                // Vector variable (C=1): grow the column count, one slice.
                // Matrix variable (C>1): fixed column count, grow slices.
                let (rows, cols, slices) = if drained.cols == 1 {
                    (drained.rows, drained.valid_count, 1)
                } else {
                    (drained.rows, drained.cols, drained.valid_count)
                };

                if let Err(err) = backend.append_numeric(buffer.name(), &drained.data, rows, cols, slices) {
                    tracing::error!(variable = buffer.name(), error = %err, "backend append failed");
                    // The drained block was already recycled; the sample
                    // data is lost for this block, but the rest of this
                    // pass continues with the remaining variables.
                    break;
                }
                blocks_written += 1;
            }
        }

        self.pending_bytes.store(0, Ordering::Relaxed);
        Ok(blocks_written)
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes.load(Ordering::Relaxed)
    }
}

impl Drop for Logger {
    /// Forces every variable into producer/consumer mode (circular mode
    /// forbids draining) and loops roll + flush until every variable is
    /// fully empty, then closes the backend.
    fn drop(&mut self) {
        let variables: Vec<Arc<VariableBuffer>> = self.variables.lock().unwrap().values().cloned().collect();
        for buffer in &variables {
            buffer.set_on_block_ready(None);
            buffer.set_mode(BufferMode::ProducerConsumer);
            buffer.roll_current_block();
        }

        if let Err(err) = self.flush_available_data() {
            tracing::error!(error = %err, "final flush during logger shutdown failed");
        }

        if let Err(err) = self.backend.lock().unwrap().close() {
            tracing::error!(error = %err, "backend close during logger shutdown failed");
        }
        tracing::info!(file = self.config.file_path(), "logger closed");
    }
}
