//! The event store: atomic multi-event append, filtered queries, streaming reads to reducers,
//! and position tracking.

use async_trait::async_trait;

use crate::error::Error;
use crate::event::{Event, EventCommand, SearchQuery};
use crate::types::Position;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Default batch size for `filter_to_reducer` streaming reads.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Something that can fold a batch of events into itself, used by `filter_to_reducer`.
///
/// Implementors are not required to be idempotent across calls to `reduce` on the *same*
/// event twice - `filter_to_reducer` guarantees each matching event is delivered exactly once
/// per call. Projection reduce functions have a stronger idempotence requirement; see
/// [`crate::projection::Projection`].
#[async_trait]
pub trait Reducer: Send {
    async fn reduce(&mut self, events: &[Event]) -> Result<(), Error>;
}

/// The event store contract. A concrete implementation (e.g.
/// [`postgres::PgEventStore`]) backs this with a relational table; callers interact only
/// through this trait.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically appends one or more commands in a single transaction and returns the
    /// persisted events with their assigned version, position and timestamp.
    ///
    /// Failure modes: [`Error::ConcurrencyConflict`] if a command's `required_sequence` does
    /// not match, [`Error::UniqueConstraintViolation`] if a unique-constraint intent
    /// conflicts, [`Error::Transient`] on a retryable storage error, [`Error::InvalidArgument`]
    /// for malformed commands (e.g. empty `commands`).
    async fn push(&self, commands: Vec<EventCommand>) -> Result<Vec<Event>, Error>;

    /// Returns events matching `query`, ordered by `(position, in_tx_order)` ascending unless
    /// a filter requests descending order.
    async fn query(&self, query: SearchQuery) -> Result<Vec<Event>, Error>;

    /// Streams matching events to `reducer` in ascending order, in batches of `batch_size`.
    /// If `reducer.reduce` returns an error, streaming stops and the error propagates without
    /// retrying that batch.
    async fn filter_to_reducer(
        &self,
        query: SearchQuery,
        reducer: &mut dyn Reducer,
        batch_size: i64,
    ) -> Result<(), Error>;

    /// The position of the last event matching `query`, or [`crate::types::ZERO_POSITION`] if
    /// none match.
    async fn latest_position(&self, query: SearchQuery) -> Result<Position, Error>;

    /// Events with `position > position` matching the optional `query`, ordered ascending.
    /// Used by projections to catch up after their checkpoint.
    async fn events_after_position(
        &self,
        position: Position,
        query: Option<SearchQuery>,
    ) -> Result<Vec<Event>, Error>;

    async fn health(&self) -> bool;
}
