use thiserror::Error;

use crate::ingest::DocumentError;
use crate::models::{BackfillResult, CanonicalSource, InvoiceFailure};

/// 旧指针不变式被破坏 (只影响当前发票)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegacyLinkError {
    #[error("{origin} record has no legacy pointer")]
    NoPointer { origin: CanonicalSource },

    #[error("{origin} record points at both legacy invoice '{invoice_id}' and xero invoice '{xero_invoice_id}'")]
    BothPointers {
        origin: CanonicalSource,
        invoice_id: String,
        xero_invoice_id: String,
    },

    #[error("{origin} record must not use the {column} pointer ('{id}')")]
    WrongPointer {
        origin: CanonicalSource,
        column: &'static str,
        id: String,
    },
}

/// 回填请求不合法
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("limit must be between 1 and {max}, got {limit}")]
    LimitOutOfRange { limit: u32, max: u32 },

    #[error("organisation_id and location_id are required")]
    MissingScope,

    #[error("unknown source '{0}', expected OCR, XERO or ALL")]
    UnknownSource(String),
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("invalid backfill request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("legacy link invariant violated: {0}")]
    LegacyLink(#[from] LegacyLinkError),

    #[error("extracted document of invoice '{invoice_id}' is malformed: {source}")]
    Document {
        invoice_id: String,
        #[source]
        source: DocumentError,
    },

    #[error("{} invoice(s) failed during backfill", .failures.len())]
    BatchFailed {
        failures: Vec<InvoiceFailure>,
        partial: BackfillResult,
    },
}

/// 质量报告导出失败
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
