pub mod aggregator;
pub mod backfill;
pub mod export;
pub mod guard;
pub mod mapping;
pub mod scanner;

pub use aggregator::BackfillStats;
pub use backfill::{BackfillService, InvoiceOutcome};
pub use export::export_quality_report;
pub use guard::resolve_legacy_link;
pub use mapping::{map_ocr_invoice, map_xero_invoice, MappedInvoice};
pub use scanner::{classify_candidate, count_by_kind, HeaderState, ReconciliationScanner};
