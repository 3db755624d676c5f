/// Number of blocks in each variable's pool (producer-owned "current" +
/// free pool + ready queue + recycle queue). Fixed at compile time so the
/// ready/recycle queues can be plain power-of-two ring buffers.
pub const N_BLOCKS: usize = 32;

/// Buffering discipline for a single variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Back-pressure: `append` fails once the pool is exhausted.
    ProducerConsumer,
    /// Ring overwrite: the oldest ready block is dropped so the producer
    /// never stalls. `drain_one_block` is rejected in this mode.
    Circular,
}

impl Default for BufferMode {
    fn default() -> Self {
        Self::ProducerConsumer
    }
}

/// How a [`crate::Logger`] opens its backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate/overwrite any existing file.
    Create,
    /// Open an existing file, read-write or read-only.
    OpenExisting { read_write: bool },
}

/// Fixed-at-construction configuration for a [`crate::Logger`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub(crate) file_path: String,
    pub(crate) enable_compression: bool,
    pub(crate) open_mode: OpenMode,
    pub(crate) default_buffer_size: usize,
    pub(crate) default_buffer_size_max_bytes: u64,
    pub(crate) wake_threshold_bytes: u64,
    pub(crate) wake_threshold_free_ratio: f64,
}

impl LoggerConfig {
    /// Creates a configuration for a fresh file at `file_path`, using the
    /// producer-consumer defaults recommended in the external interface.
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            enable_compression: false,
            open_mode: OpenMode::Create,
            default_buffer_size: 1000,
            default_buffer_size_max_bytes: 50_000_000,
            wake_threshold_bytes: 30_000_000,
            wake_threshold_free_ratio: 0.5,
        }
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    #[must_use]
    pub fn with_open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    #[must_use]
    pub fn with_default_buffer_size(mut self, samples: usize) -> Self {
        self.default_buffer_size = samples;
        self
    }

    #[must_use]
    pub fn with_default_buffer_size_max_bytes(mut self, max_bytes: u64) -> Self {
        self.default_buffer_size_max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn with_wake_threshold_bytes(mut self, bytes: u64) -> Self {
        self.wake_threshold_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_wake_threshold_free_ratio(mut self, ratio: f64) -> Self {
        self.wake_threshold_free_ratio = ratio;
        self
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}
