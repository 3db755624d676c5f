use crate::logger::Logger;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

struct WorkerState {
    running: bool,
    woken: bool,
}

/// Aggregates several [`Logger`]s behind one background flush thread.
///
/// Loggers are held weakly: a logger can be dropped (and drain itself, see
/// [`Logger`]'s destructor) without needing to deregister from its
/// appender first. The appender notices on its next sweep, when
/// [`Weak::upgrade`] returns `None`.
pub struct Appender {
    loggers: Mutex<Vec<Weak<Logger>>>,
    state: Mutex<WorkerState>,
    condvar: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Appender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            loggers: Mutex::new(Vec::new()),
            state: Mutex::new(WorkerState {
                running: true,
                woken: false,
            }),
            condvar: Condvar::new(),
            worker: Mutex::new(None),
        })
    }

    /// Registers `logger` with this appender and wires its block-ready
    /// callback to wake this appender's flush thread. Returns `false`
    /// without re-registering if `logger` (by pointer identity) is already
    /// attached.
    #[must_use]
    pub fn add_logger(self: &Arc<Self>, logger: &Arc<Logger>) -> bool {
        let mut loggers = self.loggers.lock().unwrap();
        if loggers.iter().any(|weak| weak.upgrade().is_some_and(|l| Arc::ptr_eq(&l, logger))) {
            return false;
        }
        logger.attach_appender(Arc::downgrade(self));
        loggers.push(Arc::downgrade(logger));
        true
    }

    /// Wakes the flush thread immediately, bypassing `poll_interval`.
    pub fn wake(&self) {
        let mut state = self.state.lock().unwrap();
        state.woken = true;
        self.condvar.notify_one();
    }

    /// Flushes every still-alive managed logger once, dropping dead
    /// entries. Returns the total number of blocks written.
    pub fn flush_available_data(&self) -> usize {
        let mut loggers = self.loggers.lock().unwrap();
        loggers.retain(|weak| weak.strong_count() > 0);

        let mut total = 0;
        for weak in loggers.iter() {
            if let Some(logger) = weak.upgrade() {
                match logger.flush_available_data() {
                    Ok(n) => total += n,
                    Err(err) => tracing::error!(error = %err, "appender flush failed for a managed logger"),
                }
            }
        }
        total
    }

    /// Starts the background thread that wakes on `wake()` or every
    /// `poll_interval`, whichever comes first, and flushes all managed
    /// loggers. Idempotent only in the sense that calling it twice spawns
    /// two threads; callers should call it once.
    pub fn start_flush_thread(self: &Arc<Self>, poll_interval: Duration) {
        let appender = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("matlog-appender".into())
            .spawn(move || appender.run(poll_interval))
            .expect("failed to spawn matlog appender thread");
        *self.worker.lock().unwrap() = Some(handle);
    }

    fn run(&self, poll_interval: Duration) {
        loop {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return;
            }
            if !state.woken {
                let (guard, timeout) = self.condvar.wait_timeout(state, poll_interval).unwrap();
                state = guard;
                let _ = timeout;
            }
            state.woken = false;
            let running = state.running;
            drop(state);

            if !running {
                return;
            }
            self.flush_available_data();
        }
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            state.running = false;
            state.woken = true;
        }
        self.condvar.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
