//! Generic mechanism by which a command loads a tail of events, folds them into a typed
//! state, and is later updated in-place with the events it just pushed.

use async_trait::async_trait;

use crate::error::Error;
use crate::event::{Event, Filter};
use crate::store::{EventStore, Reducer};
use crate::types::AggregateVersion;

/// Implemented by the per-aggregate state struct a command folds events into.
///
/// `reduce` must be pure and must ignore event types it does not recognise. Some write-models
/// additionally filter by a sub-entity id carried in the payload (e.g. one machine key, one
/// WebAuthn token) while still letting `sequence` advance past events belonging to other
/// sub-entities.
pub trait WriteModel: Default {
    /// Folds one event into `self`. Must not panic on an event type it does not know; such
    /// events should be ignored, not error.
    fn reduce(&mut self, event: &Event);
}

/// Base struct wrapping any [`WriteModel`] with the bookkeeping the command pipeline needs:
/// the aggregate's id, its resource owner, and the sequence number of the last event folded
/// in.
pub struct AggregateWriteModel<S: WriteModel> {
    aggregate_id: String,
    resource_owner: String,
    sequence: AggregateVersion,
    events_applied: u64,
    state: S,
}

impl<S: WriteModel> AggregateWriteModel<S> {
    pub fn new(aggregate_id: impl Into<String>, resource_owner: impl Into<String>) -> Self {
        Self::with_state(aggregate_id, resource_owner, S::default())
    }

    /// Like [`Self::new`], but seeded with a caller-supplied initial state instead of
    /// `S::default()`. Used by sub-entity write-models that need to carry a filter (e.g. which
    /// machine key or WebAuthn token they track) through every `reduce` call.
    pub fn with_state(aggregate_id: impl Into<String>, resource_owner: impl Into<String>, state: S) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            sequence: 0,
            events_applied: 0,
            state,
        }
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn resource_owner(&self) -> &str {
        &self.resource_owner
    }

    pub fn sequence(&self) -> AggregateVersion {
        self.sequence
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Loads the write-model by issuing `filter_to_reducer` over this aggregate's event
    /// stream, ordered ascending, folding every event via `S::reduce`. After this call,
    /// `sequence()` reflects the tail of the aggregate's history.
    pub async fn load(
        store: &(dyn EventStore),
        instance_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Self, Error> {
        Self::load_with_state(store, instance_id, aggregate_type, aggregate_id, S::default()).await
    }

    /// Like [`Self::load`], but the fold starts from a caller-supplied initial state rather than
    /// `S::default()` - the seam sub-entity write-models (one machine key, one WebAuthn token)
    /// use to carry their target id into `reduce` from the first event onward.
    pub async fn load_with_state(
        store: &(dyn EventStore),
        instance_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
        initial_state: S,
    ) -> Result<Self, Error> {
        let mut model = Self::with_state(aggregate_id, String::new(), initial_state);

        let filter = Filter::new(instance_id.to_string())
            .aggregate_type(aggregate_type.to_string())
            .aggregate_id(aggregate_id.to_string())
            .order(crate::event::Order::Ascending);

        store.filter_to_reducer(filter.into(), &mut model, crate::store::DEFAULT_BATCH_SIZE).await?;

        Ok(model)
    }

    /// Updates `sequence` and folds `event` in-place. Used immediately after `push` so the
    /// command's returned object-details reflect post-append state without a reload.
    pub fn append_and_reduce(&mut self, event: &Event) {
        self.sequence = event.aggregate_version;
        if self.resource_owner.is_empty() {
            self.resource_owner = event.owner.clone();
        }
        self.state.reduce(event);
        self.events_applied += 1;
    }
}

#[async_trait]
impl<S: WriteModel + Send> Reducer for AggregateWriteModel<S> {
    async fn reduce(&mut self, events: &[Event]) -> Result<(), Error> {
        for event in events {
            self.append_and_reduce(event);
        }
        Ok(())
    }
}
