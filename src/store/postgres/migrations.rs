use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Postgres, Transaction};

/// Global sentinel instance id under which global (cross-instance) unique constraints are
/// stored.
pub const GLOBAL_INSTANCE: &str = "__global__";

const CREATE_EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS events
(
    instance_id TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    aggregate_version BIGINT NOT NULL,
    event_type TEXT NOT NULL,
    payload JSONB NOT NULL,
    owner TEXT NOT NULL,
    creator TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    position BIGINT NOT NULL,
    in_tx_order INT NOT NULL,
    PRIMARY KEY (instance_id, aggregate_id, aggregate_version)
)
";

const CREATE_EVENTS_POSITION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS events_instance_position_idx ON events (instance_id, position, in_tx_order)";

const CREATE_EVENTS_AGGREGATE_INDEX: &str = "
CREATE INDEX IF NOT EXISTS events_instance_aggregate_idx
ON events (instance_id, aggregate_type, aggregate_id, aggregate_version)
";

const CREATE_EVENTS_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS events_instance_event_type_idx ON events (instance_id, event_type)";

const CREATE_POSITION_SEQUENCE: &str = "CREATE SEQUENCE IF NOT EXISTS events_position_seq";

const CREATE_UNIQUE_CONSTRAINTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS unique_constraints
(
    instance_id TEXT NOT NULL,
    constraint_type TEXT NOT NULL,
    value TEXT NOT NULL,
    error_message TEXT NOT NULL,
    PRIMARY KEY (instance_id, constraint_type, value)
)
";

const CREATE_PROJECTION_STATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS projection_state
(
    projection_name TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    last_position BIGINT NOT NULL DEFAULT 0,
    last_tick_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (projection_name, instance_id)
)
";

/// Runs all the needed migrations, transactionally. This should be called once per pool at
/// application startup.
pub(crate) async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut transaction: Transaction<Postgres> = pool.begin().await?;

    let statements = [
        CREATE_EVENTS_TABLE,
        CREATE_EVENTS_POSITION_INDEX,
        CREATE_EVENTS_AGGREGATE_INDEX,
        CREATE_EVENTS_TYPE_INDEX,
        CREATE_POSITION_SEQUENCE,
        CREATE_UNIQUE_CONSTRAINTS_TABLE,
        CREATE_PROJECTION_STATE_TABLE,
    ];

    for statement in statements {
        let _: PgQueryResult = sqlx::query(statement).execute(&mut *transaction).await?;
    }

    transaction.commit().await
}
