pub use builder::{BuildError, PgEventStoreBuilder};
pub use store::PgEventStore;

mod builder;
mod migrations;
mod row;
mod store;

pub(crate) use migrations::run_migrations;
