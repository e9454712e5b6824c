use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::db::store::CanonicalStore;
use crate::models::{
    CanonicalInvoiceHeader, CanonicalInvoiceLineItem, Candidate, HeaderDraft, LegacyInvoice,
    LegacyLink, LegacyOcrInvoice, LegacySourceKind, LegacyXeroInvoice, LineDraft, QualityStatus,
    ScanScope, WarnReason, NORMALIZATION_VERSION,
};
use crate::service::mapping::{ocr_has_line_sources, xero_has_line_sources};
use crate::service::scanner::{classify_candidate, HeaderState};

/// 发票头与其行作为一个条目保存，替换时整体写入
#[derive(Debug, Clone)]
struct StoredInvoice {
    header: CanonicalInvoiceHeader,
    lines: Vec<CanonicalInvoiceLineItem>,
}

impl StoredInvoice {
    fn state(&self) -> HeaderState {
        HeaderState {
            deleted: self.header.deleted_at.is_some(),
            line_count: self.lines.len(),
            has_stale_unknown_unit_warn: self.lines.iter().any(|l| {
                l.normalization_version != NORMALIZATION_VERSION
                    && l.line.quality_status == QualityStatus::Warn
                    && l.line.warn_reasons.iter().any(|r| r == WarnReason::UnknownUnitCategory.code())
            }),
        }
    }
}

/// 内存存储
///
/// 用于测试和试运行，语义与 Postgres 实现一致；不做性能优化。
#[derive(Debug, Default)]
pub struct InMemoryStore {
    ocr_invoices: DashMap<String, LegacyOcrInvoice>,
    xero_invoices: DashMap<String, LegacyXeroInvoice>,
    canonical: DashMap<LegacyLink, StoredInvoice>,
    failing_writes: DashMap<LegacyLink, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ocr_invoice(&self, invoice: LegacyOcrInvoice) {
        self.ocr_invoices.insert(invoice.id.clone(), invoice);
    }

    pub fn insert_xero_invoice(&self, invoice: LegacyXeroInvoice) {
        self.xero_invoices.insert(invoice.id.clone(), invoice);
    }

    /// 直接写入规范发票 (模拟历史数据，如只有头没有行)
    pub fn seed_canonical(&self, header: CanonicalInvoiceHeader, lines: Vec<CanonicalInvoiceLineItem>) {
        self.canonical
            .insert(header.legacy_link.clone(), StoredInvoice { header, lines });
    }

    /// 之后对该发票的写入均失败
    pub fn fail_writes_for(&self, link: LegacyLink, message: impl Into<String>) {
        self.failing_writes.insert(link, message.into());
    }

    pub fn header(&self, link: &LegacyLink) -> Option<CanonicalInvoiceHeader> {
        self.canonical.get(link).map(|stored| stored.header.clone())
    }

    pub fn lines(&self, link: &LegacyLink) -> Vec<CanonicalInvoiceLineItem> {
        self.canonical
            .get(link)
            .map(|stored| stored.lines.clone())
            .unwrap_or_default()
    }

    pub fn header_count(&self) -> usize {
        self.canonical.len()
    }

    fn scan(&self, scope: &ScanScope, source: LegacySourceKind, limit: u32) -> Vec<Candidate> {
        let in_scope = |org: &str, location: Option<&str>| {
            org == scope.organisation_id && location == Some(scope.location_id.as_str())
        };
        let legacy: Vec<(String, chrono::DateTime<chrono::Utc>)> = match source {
            LegacySourceKind::Ocr => self
                .ocr_invoices
                .iter()
                .filter(|inv| in_scope(&inv.organisation_id, inv.location_id.as_deref()))
                .filter(|inv| ocr_has_line_sources(inv.value()))
                .map(|inv| (inv.id.clone(), inv.created_at))
                .collect(),
            LegacySourceKind::Xero => self
                .xero_invoices
                .iter()
                .filter(|inv| in_scope(&inv.organisation_id, inv.location_id.as_deref()))
                .filter(|inv| xero_has_line_sources(inv.value()))
                .map(|inv| (inv.id.clone(), inv.created_at))
                .collect(),
        };

        let mut candidates: Vec<Candidate> = legacy
            .into_iter()
            .filter_map(|(legacy_id, created_at)| {
                let link = match source {
                    LegacySourceKind::Ocr => LegacyLink::Ocr(legacy_id.clone()),
                    LegacySourceKind::Xero => LegacyLink::Xero(legacy_id.clone()),
                };
                let state = self.canonical.get(&link).map(|stored| stored.state());
                classify_candidate(state.as_ref()).map(|kind| Candidate {
                    source,
                    legacy_id,
                    kind,
                    created_at,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.legacy_id.cmp(&b.legacy_id))
        });
        candidates.truncate(limit as usize);
        candidates
    }

    fn replace(
        &self,
        draft: &HeaderDraft,
        lines: &[LineDraft],
    ) -> Result<CanonicalInvoiceHeader, sqlx::Error> {
        if let Some(message) = self.failing_writes.get(&draft.legacy_link) {
            return Err(sqlx::Error::Protocol(message.clone()));
        }

        let mut entry = self
            .canonical
            .entry(draft.legacy_link.clone())
            .or_insert_with(|| StoredInvoice {
                header: draft.clone().into_header(draft.legacy_link.header_id()),
                lines: Vec::new(),
            });
        draft.refresh(&mut entry.header);
        let header = entry.header.clone();
        entry.lines = lines
            .iter()
            .cloned()
            .map(|line| CanonicalInvoiceLineItem::from_draft(&header, line))
            .collect();
        Ok(header)
    }
}

impl CanonicalStore for InMemoryStore {
    fn scan_candidates<'a>(
        &'a self,
        scope: &'a ScanScope,
        source: LegacySourceKind,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, sqlx::Error>> {
        async move { Ok(self.scan(scope, source, limit)) }.boxed()
    }

    fn load_legacy_invoice<'a>(
        &'a self,
        source: LegacySourceKind,
        legacy_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<LegacyInvoice>, sqlx::Error>> {
        async move {
            Ok(match source {
                LegacySourceKind::Ocr => self
                    .ocr_invoices
                    .get(legacy_id)
                    .map(|inv| LegacyInvoice::Ocr(inv.clone())),
                LegacySourceKind::Xero => self
                    .xero_invoices
                    .get(legacy_id)
                    .map(|inv| LegacyInvoice::Xero(inv.clone())),
            })
        }
        .boxed()
    }

    fn replace_canonical_invoice<'a>(
        &'a self,
        header: &'a HeaderDraft,
        lines: &'a [LineDraft],
    ) -> BoxFuture<'a, Result<CanonicalInvoiceHeader, sqlx::Error>> {
        async move { self.replace(header, lines) }.boxed()
    }

    fn list_canonical_lines<'a>(
        &'a self,
        scope: &'a ScanScope,
    ) -> BoxFuture<'a, Result<Vec<CanonicalInvoiceLineItem>, sqlx::Error>> {
        async move {
            let mut invoices: Vec<StoredInvoice> = self
                .canonical
                .iter()
                .filter(|stored| {
                    stored.header.organisation_id == scope.organisation_id
                        && stored.header.location_id == scope.location_id
                })
                .map(|stored| stored.value().clone())
                .collect();
            invoices.sort_by(|a, b| a.header.source_invoice_ref.cmp(&b.header.source_invoice_ref));
            Ok(invoices
                .into_iter()
                .flat_map(|stored| {
                    let mut lines = stored.lines;
                    lines.sort_by_key(|l| l.line.line_number);
                    lines
                })
                .collect())
        }
        .boxed()
    }
}
