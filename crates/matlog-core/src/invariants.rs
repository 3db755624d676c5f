//! Debug assertion macros for the block-ring and block-pool invariants.
//!
//! Active only in debug builds (`debug_assertions`), so there is zero
//! overhead in release builds.

/// **Invariant**: `0 <= (tail - head) <= capacity`.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-RING-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// **Invariant**: a sequence number only increases.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-RING-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// **Invariant**: `buffer[i]` is initialized iff `head <= sequence(i) < tail`.
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $head:expr, $tail:expr) => {
        debug_assert!(
            $pos >= $head && $pos < $tail,
            "INV-RING-03 violated: reading slot at seq {} outside initialized range [{}, {})",
            $pos,
            $head,
            $tail
        )
    };
}

/// **Invariant**: for every variable, `free + ready + recycle + 1 (current) == N_BLOCKS`.
macro_rules! debug_assert_block_conservation {
    ($free:expr, $ready:expr, $recycle:expr, $n_blocks:expr) => {
        debug_assert!(
            $free + $ready + $recycle + 1 == $n_blocks,
            "INV-POOL-01 violated: free {} + ready {} + recycle {} + 1 != N_BLOCKS {}",
            $free,
            $ready,
            $recycle,
            $n_blocks
        )
    };
}

pub(crate) use debug_assert_block_conservation;
pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
