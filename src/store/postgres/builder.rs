use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::bus::SubscriptionBus;
use crate::config::{Config, ConfigError};

use super::migrations;
use super::store::PgEventStore;

/// Builds a [`PgEventStore`].
pub struct PgEventStoreBuilder {
    pool: PgPool,
    bus: Option<SubscriptionBus>,
    run_migrations: bool,
}

impl PgEventStoreBuilder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            bus: None,
            run_migrations: true,
        }
    }

    /// Attaches a [`SubscriptionBus`] that receives every committed event in order. Omit this
    /// to build a store with the bus disabled.
    pub fn with_bus(mut self, bus: SubscriptionBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Skips running migrations. Use when another store (or an offline migration step)
    /// already set up the schema - running migrations concurrently from many stores is safe
    /// (all DDL is `IF NOT EXISTS`) but wasteful.
    pub fn without_running_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    pub async fn try_build(self) -> Result<PgEventStore, sqlx::Error> {
        if self.run_migrations {
            migrations::run_migrations(&self.pool).await?;
        }

        Ok(PgEventStore::new(self.pool, self.bus))
    }

    /// Connects a pool from [`Config`] and builds a store against it, owning the pool's
    /// lifecycle too.
    pub async fn try_build_from_config(config: &Config) -> Result<PgEventStore, BuildError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self::new(pool).try_build().await?)
    }

    /// Loads [`Config`] from the environment, then builds a store the same way
    /// [`Self::try_build_from_config`] does. The common entrypoint for a process bootstrapping
    /// its own pool rather than receiving one from a caller.
    pub async fn connect() -> Result<PgEventStore, BuildError> {
        let config = Config::from_env()?;
        Self::try_build_from_config(&config).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
