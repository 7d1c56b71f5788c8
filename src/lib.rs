//! Event store, write-model framework, command pipeline and projection engine for an
//! identity-and-access-management backend's write side.
//!
//! Consumers embed this crate and supply their own transport (HTTP/gRPC); it owns persistence,
//! optimistic concurrency, unique-constraint enforcement, in-process fan-out and durable
//! read-side projections.

pub mod bus;
pub mod commands;
#[cfg(feature = "postgres")]
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod permission;
#[cfg(feature = "postgres")]
pub mod projection;
pub mod store;
pub mod types;
pub mod write_model;

pub use bus::{SubscriptionBus, SubscriptionFilter};
pub use error::{CommandError, Error};
pub use event::{Event, EventCommand, Filter, Order, SearchQuery, UniqueConstraintIntent};
pub use id::Generator as IdGenerator;
pub use permission::{PermissionRequest, PermissionService};
pub use store::{EventStore, Reducer};
pub use write_model::{AggregateWriteModel, WriteModel};

#[cfg(feature = "postgres")]
pub use config::{Config, ConfigError};
#[cfg(feature = "postgres")]
pub use store::postgres::{BuildError, PgEventStore, PgEventStoreBuilder};
