//! Registry of durable, at-least-once projections, each driven by a checkpointed tick loop.
//!
//! A projection's `reduce` runs in the same transaction as its checkpoint advance, so a crash
//! between them can only repeat work, never lose it. `reduce` must therefore be idempotent
//! (UPSERT / DELETE-if-exists).

mod checkpoint;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::bus::{Subscription, SubscriptionBus, SubscriptionFilter};
use crate::error::Error;
use crate::event::{Event, Filter, SearchQuery};
use crate::store::EventStore;

/// One durable read-side consumer.
///
/// Implementors typically own one or more tables reachable only through this projection;
/// `reduce` is handed the same Postgres connection the checkpoint advance commits on, so table
/// writes and checkpoint advance are atomic.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Stable name, used as half of the checkpoint's primary key. Must never change once
    /// deployed - renaming loses the checkpoint and replays from zero.
    fn name(&self) -> &str;

    /// Event types this projection consumes. Only these are fetched per tick.
    fn event_types(&self) -> &[&'static str];

    /// Aggregate types to further narrow the fetch, or empty for "any aggregate type that
    /// produces these event types".
    fn aggregate_types(&self) -> &[&'static str] {
        &[]
    }

    fn batch_size(&self) -> i64 {
        100
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(200)
    }

    /// Applies one event to this projection's tables. Must be idempotent: replaying an
    /// already-applied event (at-least-once delivery) must be a no-op.
    async fn reduce(&self, event: &Event, connection: &mut PgConnection) -> Result<(), Error>;

    /// Deletes every row this projection owns for `instance_id`. Default no-op for projections without per-instance
    /// tables of their own (e.g. global lookups).
    async fn delete_instance(&self, _instance_id: &str, _connection: &mut PgConnection) -> Result<(), Error> {
        Ok(())
    }
}

fn projection_filter(projection: &dyn Projection, instance_id: &str) -> SearchQuery {
    let mut filter = Filter::new(instance_id.to_string());
    for event_type in projection.event_types() {
        filter = filter.event_type(*event_type);
    }
    for aggregate_type in projection.aggregate_types() {
        filter = filter.aggregate_type(*aggregate_type);
    }
    SearchQuery::single(filter)
}

/// Runs one tick of `projection` for `instance_id`: load checkpoint, fetch up to
/// `batch_size` events after it, apply each via `reduce`, advance the checkpoint, commit.
/// Returns the number of events applied.
///
/// On any failure the transaction rolls back and the checkpoint is left untouched - the next
/// tick re-attempts the same batch.
#[tracing::instrument(skip_all, fields(projection = projection.name(), instance_id))]
pub async fn tick(pool: &PgPool, projection: &dyn Projection, instance_id: &str) -> Result<usize, Error> {
    let last_position = checkpoint::load(pool, projection.name(), instance_id).await?;

    let query = projection_filter(projection, instance_id);
    let events = store_events_after(pool, last_position, query, projection.batch_size()).await?;

    if events.is_empty() {
        return Ok(0);
    }

    let mut transaction = pool.begin().await?;

    for event in &events {
        if let Err(err) = projection.reduce(event, &mut transaction).await {
            tracing::error!(error = %err, event_type = %event.event_type, position = event.position, "projection reduce failed, rolling back tick");
            return Err(err);
        }
    }

    let new_position = events.last().expect("checked non-empty above").position;
    checkpoint::advance(&mut transaction, projection.name(), instance_id, new_position).await?;

    transaction.commit().await?;

    Ok(events.len())
}

/// Thin wrapper matching [`EventStore::events_after_position`] without requiring callers of
/// `tick` to hold a `dyn EventStore` - the projection engine only ever needs Postgres directly,
/// since `reduce` writes through the same connection.
async fn store_events_after(
    pool: &PgPool,
    position: crate::types::Position,
    query: SearchQuery,
    batch_size: i64,
) -> Result<Vec<Event>, Error> {
    let mut query = query;
    for filter in &mut query.filters {
        filter.position_gt = Some(position);
        filter.limit = Some(batch_size);
        filter.order = Some(crate::event::Order::Ascending);
    }

    // Reuses the same SELECT the Postgres store builds for `query`/`events_after_position`,
    // via a throwaway store handle over the same pool (no bus - ticks never publish).
    let store = crate::store::postgres::PgEventStore::new(pool.clone(), None);
    store.events_after_position(position, Some(query)).await
}

/// Deletes every row owned by every registered projection for `instance_id`, in one
/// transaction per projection.
pub async fn cleanup_instance(pool: &PgPool, projections: &[Arc<dyn Projection>], instance_id: &str) -> Result<(), Error> {
    for projection in projections {
        let mut transaction = pool.begin().await?;
        projection.delete_instance(instance_id, &mut transaction).await?;
        checkpoint::delete_instance(pool, projection.name(), instance_id).await?;
        transaction.commit().await?;
    }
    Ok(())
}

/// Drives a set of projections against a set of tenants, ticking each on its own interval and
/// (optionally) waking early when the subscription bus signals a matching event. Bus events are only ever a wake-up signal - the checkpoint path is always the
/// data source actually applied.
pub struct ProjectionEngine {
    pool: PgPool,
    projections: Vec<Arc<dyn Projection>>,
    bus: Option<SubscriptionBus>,
    running: Arc<AtomicBool>,
}

impl ProjectionEngine {
    pub fn new(pool: PgPool, projections: Vec<Arc<dyn Projection>>) -> Self {
        Self {
            pool,
            projections,
            bus: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_bus(mut self, bus: SubscriptionBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn projections(&self) -> &[Arc<dyn Projection>] {
        &self.projections
    }

    /// Signals every running loop spawned by [`Self::spawn_all`] to stop after its current
    /// tick. Does not abort in-flight ticks.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Runs every registered projection's tick loop for `instance_id` until [`Self::stop`] is
    /// called. Each projection gets its own `tokio::spawn`ed task so a slow or poisoned
    /// projection never delays another.
    pub fn spawn_all(&self, instance_id: &str) -> Vec<tokio::task::JoinHandle<()>> {
        self.projections
            .iter()
            .cloned()
            .map(|projection| {
                let pool = self.pool.clone();
                let bus = self.bus.clone();
                let instance_id = instance_id.to_string();
                let running = self.running.clone();
                tokio::spawn(run_loop(pool, projection, instance_id, bus, running))
            })
            .collect()
    }
}

async fn run_loop(
    pool: PgPool,
    projection: Arc<dyn Projection>,
    instance_id: String,
    bus: Option<SubscriptionBus>,
    running: Arc<AtomicBool>,
) {
    let mut wake: Option<Subscription> = bus.as_ref().map(|bus| {
        bus.subscribe(SubscriptionFilter::EventTypesByAggregateType(
            [(
                projection.aggregate_types().first().copied().unwrap_or("*").to_string(),
                projection.event_types().iter().map(|e| e.to_string()).collect(),
            )]
            .into_iter()
            .collect(),
        ))
    });

    while running.load(Ordering::Acquire) {
        match tick(&pool, projection.as_ref(), &instance_id).await {
            Ok(applied) if applied > 0 => {
                tracing::debug!(projection = projection.name(), applied, "projection tick applied events");
                continue; // drain the backlog before sleeping again
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(projection = projection.name(), error = %err, "projection tick failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(projection.tick_interval()) => {}
            _ = async {
                match &mut wake {
                    Some(sub) => { sub.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {}
        }
    }
}
