use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::event::Event;

/// Maps the `events` table's columns onto [`Event`]. Kept as a separate row type (rather than
/// deriving `FromRow` on `Event` directly) so the wire/domain type stays decoupled from the
/// storage row shape.
#[derive(FromRow)]
pub(crate) struct EventRow {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub aggregate_version: i64,
    pub event_type: String,
    pub payload: Json<serde_json::Value>,
    pub owner: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub position: i64,
    pub in_tx_order: i32,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            instance_id: row.instance_id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            aggregate_version: row.aggregate_version,
            event_type: row.event_type,
            payload: row.payload.0,
            owner: row.owner,
            creator: row.creator,
            created_at: row.created_at,
            position: row.position,
            in_tx_order: row.in_tx_order,
        }
    }
}
