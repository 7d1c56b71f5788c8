use serde::{Deserialize, Serialize};

/// Monotone per-aggregate version. Starts at 1, contiguous, never reused.
pub type AggregateVersion = i64;

/// Monotone global ordering within an instance. Never reused, strictly increasing with
/// commit order.
pub type Position = i64;

/// Tie-breaker within one transactional append: all events of one `push` share a logical
/// position, ordered among themselves by this index.
pub type InTxOrder = i32;

/// Opaque tenant identifier.
pub type InstanceId = String;

/// Sentinel position meaning "no events yet" - returned by `latest_position` on an empty filter.
pub const ZERO_POSITION: Position = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub position: Position,
    pub in_tx_order: InTxOrder,
}

impl GlobalPosition {
    pub const ZERO: GlobalPosition = GlobalPosition {
        position: ZERO_POSITION,
        in_tx_order: 0,
    };
}
