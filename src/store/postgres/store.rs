use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::bus::SubscriptionBus;
use crate::error::Error;
use crate::event::{Event, EventCommand, Filter, Order, SearchQuery, UniqueConstraintIntent};
use crate::store::{EventStore, Reducer, DEFAULT_BATCH_SIZE};
use crate::types::Position;

use super::migrations::GLOBAL_INSTANCE;
use super::row::EventRow;

/// Default Postgres implementation of [`EventStore`].
///
/// Cloning is cheap: the pool is reference-counted internally by `sqlx`, and the bus (if any)
/// wraps an `Arc` too.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    bus: Option<SubscriptionBus>,
}

impl PgEventStore {
    pub(crate) fn new(pool: PgPool, bus: Option<SubscriptionBus>) -> Self {
        Self { pool, bus }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Deterministic 64-bit key for `pg_advisory_xact_lock`, derived from the aggregate's
/// coordinates so that concurrent appenders to the *same* aggregate serialize at the DB,
/// without requiring an existing row to lock via `SELECT ... FOR UPDATE` (which cannot
/// protect the very first insert for a brand-new aggregate).
fn advisory_lock_key(instance_id: &str, aggregate_type: &str, aggregate_id: &str) -> i64 {
    // FNV-1a, 64-bit. Not cryptographic; only needs to be a stable, well-distributed key.
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in instance_id
        .bytes()
        .chain(std::iter::once(0))
        .chain(aggregate_type.bytes())
        .chain(std::iter::once(0))
        .chain(aggregate_id.bytes())
    {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash as i64
}

fn push_separator(builder: &mut QueryBuilder<Postgres>, started: &mut bool) {
    if *started {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *started = true;
    }
}

fn apply_filter(builder: &mut QueryBuilder<Postgres>, filter: Filter, started: &mut bool) {
    if let Some(instance_id) = filter.instance_id {
        push_separator(builder, started);
        builder.push("instance_id = ").push_bind(instance_id);
    }
    if !filter.aggregate_types.is_empty() {
        push_separator(builder, started);
        builder.push("aggregate_type = ANY(").push_bind(filter.aggregate_types).push(")");
    }
    if !filter.aggregate_ids.is_empty() {
        push_separator(builder, started);
        builder.push("aggregate_id = ANY(").push_bind(filter.aggregate_ids).push(")");
    }
    if !filter.event_types.is_empty() {
        push_separator(builder, started);
        builder.push("event_type = ANY(").push_bind(filter.event_types).push(")");
    }
    if let Some(owner) = filter.owner {
        push_separator(builder, started);
        builder.push("owner = ").push_bind(owner);
    }
    if !filter.exclude_aggregate_types.is_empty() {
        push_separator(builder, started);
        builder
            .push("NOT (aggregate_type = ANY(")
            .push_bind(filter.exclude_aggregate_types)
            .push("))");
    }
    if !filter.exclude_aggregate_ids.is_empty() {
        push_separator(builder, started);
        builder
            .push("NOT (aggregate_id = ANY(")
            .push_bind(filter.exclude_aggregate_ids)
            .push("))");
    }
    if !filter.exclude_event_types.is_empty() {
        push_separator(builder, started);
        builder
            .push("NOT (event_type = ANY(")
            .push_bind(filter.exclude_event_types)
            .push("))");
    }
    if let Some(position_gt) = filter.position_gt {
        push_separator(builder, started);
        builder.push("position > ").push_bind(position_gt);
    }
    if let Some(position_lt) = filter.position_lt {
        push_separator(builder, started);
        builder.push("position < ").push_bind(position_lt);
    }
    if let Some(after) = filter.position_after {
        push_separator(builder, started);
        builder
            .push("(position, in_tx_order) > (")
            .push_bind(after.position)
            .push(", ")
            .push_bind(after.in_tx_order)
            .push(")");
    }
}

fn build_select(query: SearchQuery, default_order: Order, extra_limit: Option<i64>) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, payload, owner, creator, created_at, position, in_tx_order FROM events",
    );

    let mut overall_order = default_order;
    let mut overall_limit = extra_limit;

    if query.filters.len() == 1 {
        let filter = query.filters.into_iter().next().unwrap();
        overall_order = filter.order.unwrap_or(default_order);
        overall_limit = filter.limit.or(extra_limit);
        let mut started = false;
        apply_filter(&mut builder, filter, &mut started);
    } else if !query.filters.is_empty() {
        builder.push(" WHERE (");
        for (idx, filter) in query.filters.into_iter().enumerate() {
            if idx > 0 {
                builder.push(") OR (");
            }
            let mut started = true;
            // Force an always-true prefix so `apply_filter`'s first clause uses AND, not WHERE.
            builder.push("TRUE");
            apply_filter(&mut builder, filter, &mut started);
        }
        builder.push(")");
    }

    builder.push(" ORDER BY position ");
    builder.push(match overall_order {
        Order::Ascending => "ASC",
        Order::Descending => "DESC",
    });
    builder.push(", in_tx_order ");
    builder.push(match overall_order {
        Order::Ascending => "ASC",
        Order::Descending => "DESC",
    });

    if let Some(limit) = overall_limit {
        builder.push(" LIMIT ").push_bind(limit);
    }

    builder
}

fn row_to_event(row: PgRow) -> Result<Event, Error> {
    let row: EventRow = EventRow::from_row(&row)?;
    Ok(row.into())
}

#[async_trait]
impl EventStore for PgEventStore {
    #[tracing::instrument(skip_all, fields(commands = commands.len()), err)]
    async fn push(&self, commands: Vec<EventCommand>) -> Result<Vec<Event>, Error> {
        if commands.is_empty() {
            return Err(Error::InvalidArgument("push requires at least one command".to_string()));
        }

        let mut transaction: Transaction<Postgres> = self.pool.begin().await?;

        // Acquire advisory locks for every distinct aggregate touched, in a fixed order,
        // to avoid deadlocking against a concurrent push that touches an overlapping set.
        let mut lock_keys: Vec<i64> = commands
            .iter()
            .map(|c| advisory_lock_key(&c.instance_id, &c.aggregate_type, &c.aggregate_id))
            .collect();
        lock_keys.sort_unstable();
        lock_keys.dedup();
        for key in &lock_keys {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(key)
                .execute(&mut *transaction)
                .await?;
        }

        // Current max version per aggregate, used as the running counter while assigning
        // versions to this batch's commands in order.
        let mut running_version: BTreeMap<(String, String, String), i64> = BTreeMap::new();

        let occurred_on = Utc::now();
        let position: i64 = sqlx::query_scalar("SELECT nextval('events_position_seq')")
            .fetch_one(&mut *transaction)
            .await?;

        let mut events: Vec<Event> = Vec::with_capacity(commands.len());

        for (in_tx_order, command) in commands.into_iter().enumerate() {
            let key = (
                command.instance_id.clone(),
                command.aggregate_type.clone(),
                command.aggregate_id.clone(),
            );

            let current_version = match running_version.get(&key) {
                Some(v) => *v,
                None => {
                    let max: Option<i64> = sqlx::query_scalar(
                        "SELECT MAX(aggregate_version) FROM events WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
                    )
                    .bind(&command.instance_id)
                    .bind(&command.aggregate_type)
                    .bind(&command.aggregate_id)
                    .fetch_one(&mut *transaction)
                    .await?;
                    max.unwrap_or(0)
                }
            };

            if let Some(required) = command.required_sequence {
                if required != current_version {
                    return Err(Error::ConcurrencyConflict {
                        aggregate_id: command.aggregate_id,
                        expected: required,
                        actual: current_version,
                    });
                }
            }

            let new_version = current_version + 1;
            running_version.insert(key, new_version);

            let row: PgRow = sqlx::query(
                "INSERT INTO events
                 (instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, payload, owner, creator, created_at, position, in_tx_order)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 RETURNING instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, payload, owner, creator, created_at, position, in_tx_order",
            )
            .bind(&command.instance_id)
            .bind(&command.aggregate_type)
            .bind(&command.aggregate_id)
            .bind(new_version)
            .bind(&command.event_type)
            .bind(sqlx::types::Json(&command.payload))
            .bind(&command.owner)
            .bind(&command.creator)
            .bind(occurred_on)
            .bind(position)
            .bind(in_tx_order as i32)
            .fetch_one(&mut *transaction)
            .await?;

            events.push(row_to_event(row)?);

            for intent in command.unique_constraints {
                apply_unique_constraint_intent(&mut transaction, intent).await?;
            }
        }

        transaction.commit().await?;

        if let Some(bus) = &self.bus {
            bus.publish(&events).await;
        }

        Ok(events)
    }

    async fn query(&self, query: SearchQuery) -> Result<Vec<Event>, Error> {
        let builder = build_select(query, Order::Ascending, None);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_event).collect()
    }

    async fn filter_to_reducer(
        &self,
        query: SearchQuery,
        reducer: &mut dyn Reducer,
        batch_size: i64,
    ) -> Result<(), Error> {
        let batch_size = if batch_size <= 0 { DEFAULT_BATCH_SIZE } else { batch_size };

        // Re-derive the filter's lower bound on every iteration from the last event seen, so
        // this works as a cursor over a (possibly huge) result set instead of loading it all
        // at once. Only a single filter (no OR) can be paginated this way without ambiguity;
        // callers that need an OR'd query should batch client-side instead.
        let base_filter = match query.filters.len() {
            1 => query.filters[0].clone(),
            _ => {
                return Err(Error::InvalidArgument(
                    "filter_to_reducer requires a single (non-OR'd) filter".to_string(),
                ))
            }
        };

        // A composite (position, in_tx_order) cursor, not a bare position: several events of
        // one transactional push share a single position, tie-broken by in_tx_order, so a bare
        // "position > cursor" bound would skip the rest of that group whenever a batch boundary
        // falls inside it. i32::MAX as the starting in_tx_order makes the first fetch behave
        // like a plain "position > cursor" bound, since no push emits that many events in one
        // transaction.
        let mut cursor = crate::types::GlobalPosition {
            position: base_filter.position_gt.unwrap_or(0),
            in_tx_order: i32::MAX,
        };

        loop {
            let mut filter = base_filter.clone();
            filter.position_gt = None;
            filter.position_after = Some(cursor);
            filter.order = Some(Order::Ascending);
            filter.limit = Some(batch_size);

            let builder = build_select(SearchQuery::single(filter), Order::Ascending, None);
            let rows = builder.build().fetch_all(&self.pool).await?;
            let batch_len = rows.len();
            let batch: Vec<Event> = rows.into_iter().map(row_to_event).collect::<Result<_, _>>()?;

            if let Some(last) = batch.last() {
                cursor = crate::types::GlobalPosition {
                    position: last.position,
                    in_tx_order: last.in_tx_order,
                };
            }

            reducer.reduce(&batch).await?;

            if (batch_len as i64) < batch_size {
                break;
            }
        }

        Ok(())
    }

    async fn latest_position(&self, query: SearchQuery) -> Result<Position, Error> {
        let builder = build_select(query, Order::Descending, Some(1));
        let row = builder.build().fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(row.try_get::<i64, _>("position")?),
            None => Ok(crate::types::ZERO_POSITION),
        }
    }

    async fn events_after_position(
        &self,
        position: Position,
        query: Option<SearchQuery>,
    ) -> Result<Vec<Event>, Error> {
        let mut query = query.unwrap_or_else(|| SearchQuery::single(Filter::default()));
        for filter in &mut query.filters {
            filter.position_gt = Some(position);
        }
        self.query(query).await
    }

    async fn health(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

async fn apply_unique_constraint_intent(
    transaction: &mut Transaction<'_, Postgres>,
    intent: UniqueConstraintIntent,
) -> Result<(), Error> {
    match intent {
        UniqueConstraintIntent::Add {
            constraint_type,
            value,
            error_message,
            instance_id,
        } => {
            let instance_id = instance_id.unwrap_or_else(|| GLOBAL_INSTANCE.to_string());
            let result = sqlx::query(
                "INSERT INTO unique_constraints (instance_id, constraint_type, value, error_message) VALUES ($1, $2, $3, $4)",
            )
            .bind(&instance_id)
            .bind(&constraint_type)
            .bind(&value)
            .bind(&error_message)
            .execute(&mut **transaction)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                    Err(Error::UniqueConstraintViolation {
                        constraint_type,
                        value,
                        message: error_message,
                    })
                }
                Err(err) => Err(err.into()),
            }
        }
        UniqueConstraintIntent::Remove {
            constraint_type,
            value,
            instance_id,
        } => {
            let instance_id = instance_id.unwrap_or_else(|| GLOBAL_INSTANCE.to_string());
            // Missing row is not an error.
            sqlx::query("DELETE FROM unique_constraints WHERE instance_id = $1 AND constraint_type = $2 AND value = $3")
                .bind(&instance_id)
                .bind(&constraint_type)
                .bind(&value)
                .execute(&mut **transaction)
                .await?;
            Ok(())
        }
    }
}
