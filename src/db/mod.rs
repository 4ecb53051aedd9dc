pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::{create_pool, run_migrations, PgStore};
pub use store::{InteractionFilter, ItemFilter, Store};

#[cfg(test)]
pub use store::MockStore;
