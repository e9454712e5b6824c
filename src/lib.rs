pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, CanonicalStore, InMemoryStore, PgCanonicalStore};
pub use error::{BackfillError, ExportError, LegacyLinkError, RequestError};
pub use normalize::canonicalize_line;
pub use service::{export_quality_report, BackfillService};
