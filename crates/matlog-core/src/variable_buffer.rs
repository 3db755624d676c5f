use crate::block::{Block, BlockInfo, DrainedBlock};
use crate::config::{BufferMode, N_BLOCKS};
use crate::error::VariableError;
use crate::invariants::debug_assert_block_conservation;
use crate::ring::Ring;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

type BlockReadyCallback = Box<dyn Fn(BlockInfo) + Send + 'static>;

const MODE_PRODUCER_CONSUMER: u8 = 0;
const MODE_CIRCULAR: u8 = 1;

/// Per-variable lock-free SPSC pipeline: converts a stream of equal-shape
/// samples into a stream of dense blocks without locks or allocation.
///
/// `current` and the free pool are mutated only by the producer; this is
/// sound because a `VariableBuffer` is only ever handed to one producer
/// (see [`crate::logger::VariableHandle`]), which is the same single-writer
/// contract [`Ring`] itself relies on for its cached head/tail.
pub struct VariableBuffer {
    name: String,
    rows: usize,
    cols: usize,
    sample_len: usize,

    current: UnsafeCell<Option<Box<Block>>>,
    free_pool: UnsafeCell<Vec<Box<Block>>>,
    ready_queue: Ring<Box<Block>>,
    recycle_queue: Ring<Box<Block>>,

    mode: AtomicU8,
    on_block_ready: Mutex<Option<BlockReadyCallback>>,
}

// SAFETY: `current`/`free_pool` are touched only by the producer thread
// (the sole holder of a `VariableHandle` for this buffer); `ready_queue`
// and `recycle_queue` are themselves Sync SPSC rings.
unsafe impl Sync for VariableBuffer {}

impl VariableBuffer {
    pub(crate) fn new(name: String, rows: usize, cols: usize, block_capacity: usize) -> Self {
        let sample_len = rows * cols;
        let mut free_pool = Vec::with_capacity(N_BLOCKS - 1);
        for _ in 0..N_BLOCKS - 1 {
            free_pool.push(Box::new(Block::new(rows, cols, block_capacity)));
        }
        let current = Box::new(Block::new(rows, cols, block_capacity));

        Self {
            name,
            rows,
            cols,
            sample_len,
            current: UnsafeCell::new(Some(current)),
            free_pool: UnsafeCell::new(free_pool),
            ready_queue: Ring::new(N_BLOCKS),
            recycle_queue: Ring::new(N_BLOCKS),
            mode: AtomicU8::new(MODE_PRODUCER_CONSUMER),
            on_block_ready: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn mode(&self) -> BufferMode {
        match self.mode.load(Ordering::Relaxed) {
            MODE_CIRCULAR => BufferMode::Circular,
            _ => BufferMode::ProducerConsumer,
        }
    }

    /// Sets the buffering discipline. Safe to call at any time, including
    /// after samples have already been appended; a logger's shutdown path
    /// relies on being able to force PRODUCER_CONSUMER mode on a variable
    /// that was run in CIRCULAR mode the whole time, so it can drain.
    pub fn set_mode(&self, mode: BufferMode) {
        let raw = match mode {
            BufferMode::ProducerConsumer => MODE_PRODUCER_CONSUMER,
            BufferMode::Circular => MODE_CIRCULAR,
        };
        self.mode.store(raw, Ordering::Relaxed);
    }

    /// Installs the block-ready callback. Runs on the producer thread, must
    /// not block and must not call back into this buffer.
    pub fn set_on_block_ready(&self, callback: Option<BlockReadyCallback>) {
        *self.on_block_ready.lock().unwrap() = callback;
    }

    /// Writes one `rows * cols` sample into the current block, publishing
    /// it to the ready queue the moment it fills. `Ok(false)` means
    /// back-pressure (PRODUCER_CONSUMER, pool exhausted); the sample was
    /// not buffered.
    pub fn append(&self, sample: &[f64]) -> Result<bool, VariableError> {
        if sample.len() != self.sample_len {
            return Err(VariableError::ShapeMismatch {
                expected: self.sample_len,
                actual: sample.len(),
            });
        }

        // The current block can only already be full here if an earlier
        // call's publish attempt overflowed (PRODUCER_CONSUMER, pool
        // exhausted) and left it in place; retry that roll now.
        let already_full = {
            // SAFETY: producer-only access, see struct docs.
            let current = unsafe { &mut *self.current.get() };
            current.as_ref().expect("producer always holds a current block").is_full()
        };
        if already_full && !self.roll_current_block() {
            return Ok(false);
        }

        // SAFETY: producer-only access, see struct docs.
        let current = unsafe { &mut *self.current.get() };
        let block = current.as_mut().expect("producer always holds a current block");
        block.push_sample(sample);

        if block.is_full() {
            // Publish eagerly so the consumer can see a full block without
            // waiting for the next append call. A PRODUCER_CONSUMER
            // overflow here is not reported to this call — the sample was
            // already accepted; the next append retries the roll via the
            // `already_full` branch above.
            self.roll_current_block();
        }

        Ok(true)
    }

    /// Implements the `roll_current_block` algorithm from the component
    /// design: publish the current (full, or forced by destruction) block
    /// to the ready queue and obtain a fresh current block.
    ///
    /// Returns `false` only for PRODUCER_CONSUMER overflow (pool
    /// exhausted); the current block is left untouched in that case.
    pub(crate) fn roll_current_block(&self) -> bool {
        // SAFETY: producer-only access.
        let current_slot = unsafe { &mut *self.current.get() };
        let mut current = current_slot.take().expect("producer always holds a current block");

        if current.write_idx() == 0 {
            *current_slot = Some(current);
            return true;
        }

        let new_bytes = current.write_idx() * self.sample_len * std::mem::size_of::<f64>();
        let free_ratio =
            (self.ready_queue.capacity() - self.ready_queue.len()) as f64 / N_BLOCKS as f64;

        // SAFETY: producer-only access.
        let free_pool = unsafe { &mut *self.free_pool.get() };
        while let Some(recycled) = self.recycle_queue.try_pop() {
            free_pool.push(recycled);
        }

        let new_block = if let Some(block) = free_pool.pop() {
            block
        } else {
            match self.mode() {
                BufferMode::ProducerConsumer => {
                    tracing::warn!(
                        variable = self.name,
                        free_ratio,
                        "producer/consumer buffer overflow: free pool exhausted, append will back-pressure"
                    );
                    *current_slot = Some(current);
                    return false;
                }
                BufferMode::Circular => match self.ready_queue.try_pop() {
                    Some(oldest) => {
                        tracing::trace!(variable = self.name, "circular mode: overwriting oldest ready block");
                        oldest
                    }
                    None => {
                        // No block anywhere: violates the pool conservation
                        // invariant and should be unreachable.
                        *current_slot = Some(current);
                        return false;
                    }
                },
            }
        };
        let mut new_block = new_block;
        new_block.reset();

        let pushed = self.ready_queue.push(current);
        debug_assert!(pushed, "ready queue push must succeed: the pool invariant guarantees a free slot");

        debug_assert_block_conservation!(
            free_pool.len(),
            self.ready_queue.len(),
            self.recycle_queue.len(),
            N_BLOCKS
        );

        *current_slot = Some(new_block);

        tracing::debug!(variable = self.name, new_bytes, free_ratio, "block rolled to ready queue");

        if let Some(callback) = self.on_block_ready.lock().unwrap().as_ref() {
            callback(BlockInfo {
                variable_name: self.name.clone(),
                new_bytes,
                free_ratio,
            });
        }
        true
    }

    /// Pops at most one block from the ready queue, copies its valid
    /// samples out, and recycles it. Rejected under CIRCULAR mode.
    pub fn drain_one_block(&self) -> Result<Option<DrainedBlock>, VariableError> {
        if self.mode() == BufferMode::Circular {
            return Err(VariableError::ModeViolation);
        }

        let Some(mut block) = self.ready_queue.try_pop() else {
            return Ok(None);
        };

        let valid_count = block.write_idx();
        let data = block.valid_data().to_vec();
        block.reset();
        let recycled = self.recycle_queue.push(block);
        debug_assert!(recycled, "recycle queue push must succeed: capacity equals N_BLOCKS");

        Ok(Some(DrainedBlock {
            data,
            rows: self.rows,
            cols: self.cols,
            valid_count,
        }))
    }
}
