use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AggregateVersion, GlobalPosition, InTxOrder, InstanceId, Position};

/// An immutable, persisted fact. Events are never modified or deleted; position
/// is strictly increasing with commit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub instance_id: InstanceId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub aggregate_version: AggregateVersion,
    pub event_type: String,
    pub payload: Value,
    pub owner: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub position: Position,
    pub in_tx_order: InTxOrder,
}

impl Event {
    /// Deserializes the payload into a caller-supplied event-payload type. Unknown JSON fields
    /// are tolerated by construction (serde ignores them unless `deny_unknown_fields` is set,
    /// which this crate never sets on event payloads).
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Intent to add or remove a row in the unique-constraints table, carried on a command and
/// applied in order during `push`.
#[derive(Debug, Clone)]
pub enum UniqueConstraintIntent {
    Add {
        constraint_type: String,
        value: String,
        /// Error message/code surfaced to the caller if the add conflicts.
        error_message: String,
        /// `None` for a global constraint (checked across all instances).
        instance_id: Option<InstanceId>,
    },
    Remove {
        constraint_type: String,
        value: String,
        instance_id: Option<InstanceId>,
    },
}

/// One command to append, as accepted by [`crate::store::EventStore::push`]. Several commands
/// pushed together commit in one transaction.
#[derive(Debug, Clone)]
pub struct EventCommand {
    pub instance_id: InstanceId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub owner: String,
    pub creator: String,
    /// If set, `push` fails with `ConcurrencyConflict` unless the aggregate's current max
    /// version equals this value exactly (optimistic concurrency).
    pub required_sequence: Option<AggregateVersion>,
    pub unique_constraints: Vec<UniqueConstraintIntent>,
}

impl EventCommand {
    pub fn new(
        instance_id: impl Into<InstanceId>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
        owner: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            owner: owner.into(),
            creator: creator.into(),
            required_sequence: None,
            unique_constraints: Vec::new(),
        }
    }

    pub fn with_required_sequence(mut self, sequence: AggregateVersion) -> Self {
        self.required_sequence = Some(sequence);
        self
    }

    pub fn with_unique_constraint(mut self, intent: UniqueConstraintIntent) -> Self {
        self.unique_constraints.push(intent);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Filter predicate for `query`/`filter_to_reducer`/`events_after_position`.
///
/// All populated positive sets are ANDed (membership); exclusions are ANDed-not. A
/// [`Filter`] corresponds to one AND-clause; [`SearchQuery`] ORs several of these together.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub instance_id: Option<InstanceId>,
    pub aggregate_types: Vec<String>,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<String>,
    pub owner: Option<String>,
    pub exclude_aggregate_types: Vec<String>,
    pub exclude_aggregate_ids: Vec<String>,
    pub exclude_event_types: Vec<String>,
    pub position_gt: Option<Position>,
    pub position_lt: Option<Position>,
    /// Composite cursor for pagination: matches rows whose `(position, in_tx_order)` pair
    /// sorts strictly after this one. Unlike `position_gt`, this doesn't skip the remaining
    /// events of a position shared by several events of one transactional `push` when a batch
    /// boundary falls inside that group.
    pub position_after: Option<GlobalPosition>,
    pub limit: Option<i64>,
    pub order: Option<Order>,
}

impl Filter {
    pub fn new(instance_id: impl Into<InstanceId>) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            ..Default::default()
        }
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_types.push(aggregate_type.into());
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_ids.push(aggregate_id.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn after_position(mut self, position: Position) -> Self {
        self.position_gt = Some(position);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

/// A top-level search: the OR of one or more [`Filter`]s.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub filters: Vec<Filter>,
}

impl SearchQuery {
    pub fn single(filter: Filter) -> Self {
        Self { filters: vec![filter] }
    }

    pub fn or(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl From<Filter> for SearchQuery {
    fn from(filter: Filter) -> Self {
        SearchQuery::single(filter)
    }
}
