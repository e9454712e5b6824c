pub mod backfill;
pub mod canonical;
pub mod legacy;
pub mod warn;

pub use backfill::{
    BackfillProgress, BackfillRequest, BackfillResult, Candidate, CandidateKind, InvoiceFailure,
    ScanScope, SkipReason, SourceSelector,
};
pub use canonical::{
    AdjustmentStatus, CanonicalInvoiceHeader, CanonicalInvoiceLineItem, CanonicalSource,
    HeaderDraft, LegacyLink, LineDraft, QualityStatus, UnitCategory, NORMALIZATION_VERSION,
};
pub use legacy::{
    LegacyInvoice, LegacyOcrInvoice, LegacySourceKind, LegacyXeroInvoice, ManualLineItem,
    XeroLineItem,
};
pub use warn::WarnReason;
