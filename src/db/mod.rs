pub mod memory;
pub mod pool;
pub mod queries;
pub mod store;

pub use memory::InMemoryStore;
pub use pool::{create_pool, run_migrations};
pub use queries::PgCanonicalStore;
pub use store::CanonicalStore;
