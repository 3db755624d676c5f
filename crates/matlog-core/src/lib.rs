//! Lock-free, allocation-free numeric logging engine for real-time control
//! loops: the hot `append` path never locks, never allocates, and never
//! blocks on I/O. Buffered samples are handed off to a backend (see
//! [`backend::MatBackend`]) on a separate flush thread.

mod appender;
mod backend;
mod block;
mod config;
mod error;
mod invariants;
mod logger;
mod mat_data;
mod reservation;
mod ring;
pub mod testing;
mod variable_buffer;

pub use appender::Appender;
pub use backend::{MatBackend, NullBackend};
pub use block::{BlockInfo, DrainedBlock};
pub use config::{BufferMode, LoggerConfig, OpenMode, N_BLOCKS};
pub use error::{BackendError, LoggerError, MatDataError, VariableError};
pub use logger::{Logger, VariableHandle};
pub use mat_data::{Mat64, MatData, MatScalar};
