use crate::invariants::{
    debug_assert_bounded_count, debug_assert_initialized_read, debug_assert_monotonic,
};
use crate::reservation::Reservation;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This is a single-producer/single-consumer ring buffer passing block
// ownership between the logging thread and the flushing thread. It is the
// only synchronization primitive between the two.
//
// ## Sequence numbers (ABA prevention)
//
// `head`/`tail` are unbounded u64 sequence numbers rather than wrapped
// indices. Buffer index is computed as `sequence & mask` only when
// accessing slots, so there is no ABA problem to worry about.
//
// ## Memory ordering protocol
//
// Producer: load `tail` Relaxed (only the producer writes it), check the
// cached head, write data, then store `tail` Release to publish the write.
// Consumer: load `head` Relaxed (only the consumer writes it), check the
// cached tail (refreshed via Acquire on `tail` when stale), read data, then
// store `head` Release to publish consumption.
//
// `cached_head`/`cached_tail` are `UnsafeCell`s with a single writer each
// (producer and consumer respectively), so unsynchronized reads of them by
// their owning thread are sound.
// =============================================================================

/// Single-producer/single-consumer ring buffer, 128-byte aligned to avoid
/// false sharing between the producer-hot and consumer-hot cache lines.
#[repr(C)]
pub struct Ring<T> {
    tail: crossbeam_utils::CachePadded<AtomicU64>,
    cached_head: crossbeam_utils::CachePadded<UnsafeCell<u64>>,

    head: crossbeam_utils::CachePadded<AtomicU64>,
    cached_tail: crossbeam_utils::CachePadded<UnsafeCell<u64>>,

    capacity: usize,
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// Safety: the producer only ever touches tail/cached_head/buffer[tail..],
// the consumer only ever touches head/cached_tail/buffer[..head]; the two
// ranges never overlap and the atomics provide the handoff.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a new ring buffer. `capacity` must be a power of two.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity.is_power_of_two(), "capacity must be a nonzero power of two");

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);
        let buffer = buffer.into_boxed_slice();

        Self {
            tail: crossbeam_utils::CachePadded::new(AtomicU64::new(0)),
            cached_head: crossbeam_utils::CachePadded::new(UnsafeCell::new(0)),
            head: crossbeam_utils::CachePadded::new(AtomicU64::new(0)),
            cached_tail: crossbeam_utils::CachePadded::new(UnsafeCell::new(0)),
            capacity,
            buffer: UnsafeCell::new(buffer),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn mask(&self) -> usize {
        self.capacity - 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    // -------------------------------------------------------------------
    // PRODUCER API
    // -------------------------------------------------------------------

    /// Reserves `n` contiguous slots for zero-copy writing. `None` if full.
    ///
    /// The returned reservation may contain fewer than `n` slots if the
    /// reservation would wrap around the buffer boundary.
    pub fn reserve(&self, n: usize) -> Option<Reservation<'_, T>> {
        if n == 0 || n > self.capacity {
            return None;
        }

        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head has a single writer, the producer.
        let cached_head = unsafe { *self.cached_head.get() };
        let space = self.capacity.saturating_sub(tail.wrapping_sub(cached_head) as usize);

        if space >= n {
            return Some(self.make_reservation(tail, n));
        }

        let head = self.head.load(Ordering::Acquire);
        // SAFETY: cached_head has a single writer, the producer; the Acquire
        // load above synchronizes with the consumer's Release store to head.
        unsafe {
            *self.cached_head.get() = head;
        }

        let space = self.capacity.saturating_sub(tail.wrapping_sub(head) as usize);
        if space < n {
            return None;
        }

        Some(self.make_reservation(tail, n))
    }

    fn make_reservation(&self, tail: u64, n: usize) -> Reservation<'_, T> {
        let mask = self.mask();
        let idx = (tail as usize) & mask;
        let contiguous = n.min(self.capacity - idx);

        // SAFETY: idx is in bounds; these slots lie beyond the current tail
        // so the consumer cannot be reading them; commit() publishes via a
        // Release store on tail.
        let slice = unsafe {
            let buffer = &mut *self.buffer.get();
            &mut buffer[idx..idx + contiguous]
        };

        Reservation::new(slice, self as *const Self)
    }

    pub(crate) fn commit_internal(&self, n: usize) {
        let tail = self.tail.load(Ordering::Relaxed);
        let new_tail = tail.wrapping_add(n as u64);
        let head = self.head.load(Ordering::Relaxed);

        debug_assert_bounded_count!(new_tail.wrapping_sub(head) as usize, self.capacity);
        debug_assert_monotonic!("tail", tail, new_tail);

        self.tail.store(new_tail, Ordering::Release);
    }

    /// Pushes a single item. Returns `false` if the ring is full.
    #[inline]
    pub fn push(&self, item: T) -> bool {
        self.reserve(1).is_some_and(|mut r| {
            r.as_mut_slice()[0] = MaybeUninit::new(item);
            r.commit();
            true
        })
    }

    // -------------------------------------------------------------------
    // CONSUMER API
    // -------------------------------------------------------------------

    /// Returns the currently readable slice, or `None` if empty.
    pub fn readable(&self) -> Option<&[T]> {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail has a single writer, the consumer.
        let mut cached_tail = unsafe { *self.cached_tail.get() };
        let mut avail = cached_tail.wrapping_sub(head) as usize;

        if avail == 0 {
            cached_tail = self.tail.load(Ordering::Acquire);
            // SAFETY: cached_tail has a single writer, the consumer; the
            // Acquire load synchronizes with the producer's Release store.
            unsafe {
                *self.cached_tail.get() = cached_tail;
            }
            avail = cached_tail.wrapping_sub(head) as usize;
            if avail == 0 {
                return None;
            }
        }

        let mask = self.mask();
        let idx = (head as usize) & mask;
        let contiguous = avail.min(self.capacity - idx);

        // SAFETY: items in [head, tail) were published by the producer via
        // Release; the Acquire load above (or the Relaxed fast path, valid
        // because avail > 0 implies a prior Acquire observed them) pairs
        // with it.
        unsafe {
            let buffer = &*self.buffer.get();
            Some(std::slice::from_raw_parts(buffer[idx..].as_ptr().cast::<T>(), contiguous))
        }
    }

    #[inline]
    pub fn advance(&self, n: usize) {
        let head = self.head.load(Ordering::Relaxed);
        let new_head = head.wrapping_add(n as u64);
        debug_assert_monotonic!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);
    }

    /// Consumes up to `max_items` items with a single head update,
    /// transferring ownership to `handler`.
    pub fn consume_up_to_owned<F>(&self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        if max_items == 0 {
            return 0;
        }

        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let avail = tail.wrapping_sub(head) as usize;
        if avail == 0 {
            return 0;
        }

        let to_consume = avail.min(max_items);
        let mask = self.mask();
        let mut pos = head;
        let mut count = 0;

        while count < to_consume {
            debug_assert_initialized_read!(pos, head, tail);
            let idx = (pos as usize) & mask;
            // SAFETY: slot is within [head, tail), fully written by the
            // producer; assume_init_read moves it out, leaving the slot
            // logically consumed once head advances past it below.
            let item = unsafe {
                let buffer = &*self.buffer.get();
                buffer[idx].assume_init_read()
            };
            handler(item);
            pos = pos.wrapping_add(1);
            count += 1;
        }

        self.head.store(head.wrapping_add(count as u64), Ordering::Release);
        count
    }

    /// Pops a single item by value, or `None` if empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let mut out = None;
        self.consume_up_to_owned(1, |item| out = Some(item));
        out
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let count = tail.wrapping_sub(head) as usize;

        if count > 0 {
            let mask = self.mask();
            let buffer = self.buffer.get_mut();
            for i in 0..count {
                let idx = (head as usize).wrapping_add(i) & mask;
                unsafe {
                    ptr::drop_in_place(buffer[idx].as_mut_ptr());
                }
            }
        }
    }
}
