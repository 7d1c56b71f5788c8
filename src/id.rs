//! Monotone, time-ordered id generation for aggregates.
//!
//! A plain `Uuid::new_v4()` is not time-ordered, so it is kept only for correlation/request ids
//! elsewhere in the crate; aggregate ids go through [`Generator`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bits reserved for the per-millisecond sequence. 12 bits allows 4096 ids per millisecond
/// per node before the generator spins waiting for the clock to advance, mirroring a
/// classic Snowflake layout (41 bits time | 10 bits node | 12 bits sequence, simplified here
/// to a single-node 10-bit sequence since this crate does not coordinate across replicas).
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const NODE_BITS: u32 = 10;
const NODE_MASK: i64 = (1 << NODE_BITS) - 1;

/// A monotone, collision-free-per-node id generator. Construct one per process (or per
/// shard) and share it; it is safe to call from multiple threads concurrently.
pub struct Generator {
    node_id: i64,
    state: AtomicI64,
}

impl Generator {
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: (node_id as i64) & NODE_MASK,
            state: AtomicI64::new(0),
        }
    }

    /// Returns the next id as an opaque, base-10 string. Time-ordered: two ids generated in
    /// increasing wall-clock order from the same generator always compare in the same order
    /// as strings of equal length (left-padded is not needed since the numeric value itself
    /// is monotone; callers needing lexicographic sort should zero-pad).
    pub fn next_id(&self) -> String {
        self.next_i64().to_string()
    }

    fn next_i64(&self) -> i64 {
        loop {
            let now_ms = now_millis();
            let prev = self.state.load(Ordering::Acquire);
            let prev_ms = prev >> SEQUENCE_BITS;

            let (ms, seq) = if now_ms > prev_ms {
                (now_ms, 0)
            } else {
                let next_seq = (prev & SEQUENCE_MASK) + 1;
                if next_seq > SEQUENCE_MASK {
                    // Sequence exhausted within this millisecond: spin until the clock ticks.
                    continue;
                }
                (prev_ms, next_seq)
            };

            let next = (ms << SEQUENCE_BITS) | seq;
            if self
                .state
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return (ms << (NODE_BITS + SEQUENCE_BITS)) | (seq << NODE_BITS) | self.node_id;
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}
