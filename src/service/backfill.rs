use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::db::CanonicalStore;
use crate::error::BackfillError;
use crate::models::{
    BackfillProgress, BackfillRequest, BackfillResult, Candidate, HeaderDraft, InvoiceFailure,
    LegacyInvoice, LineDraft, SkipReason,
};
use crate::service::aggregator::BackfillStats;
use crate::service::guard::resolve_legacy_link;
use crate::service::mapping::{map_ocr_invoice, map_xero_invoice};
use crate::service::scanner::{count_by_kind, ReconciliationScanner};

/// 单张发票的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    Processed(Vec<LineDraft>),
    Skipped(SkipReason),
}

/// 回填执行器
///
/// 发票逐张顺序处理，每张发票的头+行替换是一个事务。
/// 单张失败不影响其他发票，运行结束后统一以 [`BackfillError::BatchFailed`] 返回。
pub struct BackfillService<S: CanonicalStore + ?Sized> {
    store: Arc<S>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<S: CanonicalStore + ?Sized> BackfillService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, cancel: None }
    }

    /// 取消标志只在发票之间检查
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// 对一个门店执行一次回填
    pub async fn run<F>(&self, request: &BackfillRequest, mut progress: F) -> Result<BackfillResult, BackfillError>
    where
        F: FnMut(BackfillProgress),
    {
        let sources = request.source.sources();
        tracing::info!(
            "开始回填 {}/{} 来源 {} limit {}",
            request.scope.organisation_id, request.scope.location_id, request.source, request.limit
        );
        progress(BackfillProgress::ScanStarted {
            sources: sources.to_vec(),
            limit: request.limit,
        });

        let scanner = ReconciliationScanner::new(self.store.as_ref());
        let mut stats = BackfillStats::new();
        let mut failures: Vec<InvoiceFailure> = Vec::new();
        let mut cancelled = false;

        for &source in sources {
            // 扫描失败属于整次运行的失败
            let candidates = scanner
                .scan_source(&request.scope, source, request.limit)
                .await?;
            let (new, repair, rebuild) = count_by_kind(&candidates);
            progress(BackfillProgress::SourceScanned {
                source,
                new,
                repair,
                rebuild,
            });

            let before = stats;
            let failed_before = failures.len();
            let total = candidates.len();

            for (idx, candidate) in candidates.iter().enumerate() {
                if self.cancelled() {
                    tracing::warn!("回填已取消，剩余 {} 张 {} 发票未处理", total - idx, source);
                    cancelled = true;
                    break;
                }

                match self.process_candidate(candidate).await {
                    Ok(InvoiceOutcome::Processed(lines)) => stats.record_invoice(&lines),
                    Ok(InvoiceOutcome::Skipped(reason)) => {
                        tracing::warn!(
                            "Skipping {} invoice {}: {:?}",
                            candidate.source, candidate.legacy_id, reason
                        );
                        stats.record_skip();
                    }
                    Err(e) => {
                        tracing::warn!(
                            "{} invoice {} failed: {}",
                            candidate.source, candidate.legacy_id, e
                        );
                        failures.push(InvoiceFailure {
                            source: candidate.source,
                            legacy_id: candidate.legacy_id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            progress(BackfillProgress::SourceCompleted {
                source,
                invoices_processed: stats.invoices_processed - before.invoices_processed,
                skipped: stats.skipped - before.skipped,
                failed: failures.len() - failed_before,
            });

            if cancelled {
                break;
            }
        }

        let result = stats.to_result(cancelled);
        tracing::info!(
            "回填完成: 发票 {}, 行 {}, 跳过 {}, OK {}, WARN {}, warn rate {:.4}",
            result.invoices_processed,
            result.lines_processed,
            result.skipped,
            result.ok_lines,
            result.warn_lines,
            result.warn_rate
        );

        progress(BackfillProgress::Completed(result.clone()));

        if !failures.is_empty() {
            tracing::error!("回填结束，{} 张发票失败", failures.len());
            return Err(BackfillError::BatchFailed {
                failures,
                partial: result,
            });
        }

        Ok(result)
    }

    /// 处理单个候选：读取旧发票、映射、校验旧指针、事务替换
    pub async fn process_candidate(&self, candidate: &Candidate) -> Result<InvoiceOutcome, BackfillError> {
        let Some(invoice) = self
            .store
            .load_legacy_invoice(candidate.source, &candidate.legacy_id)
            .await?
        else {
            return Ok(InvoiceOutcome::Skipped(SkipReason::LegacyInvoiceMissing));
        };

        let Some(location_id) = invoice.location_id().map(str::to_string) else {
            return Ok(InvoiceOutcome::Skipped(SkipReason::MissingLocation));
        };

        let mapped = match &invoice {
            LegacyInvoice::Ocr(inv) => map_ocr_invoice(inv)?,
            LegacyInvoice::Xero(inv) => map_xero_invoice(inv),
        };
        // 不写出没有行的发票头，否则下次扫描又会作为 REPAIR 出现
        if mapped.lines.is_empty() {
            return Ok(InvoiceOutcome::Skipped(SkipReason::NoLineItems));
        }

        let legacy_link = resolve_legacy_link(
            mapped.source,
            mapped.legacy_invoice_id.as_deref(),
            mapped.legacy_xero_invoice_id.as_deref(),
        )?;

        let draft = HeaderDraft {
            organisation_id: mapped.organisation_id,
            location_id,
            supplier_id: mapped.supplier_id,
            source: mapped.source,
            legacy_link,
            date: mapped.date,
            currency_code: mapped.currency_code,
            deleted_at: mapped.deleted_at,
        };

        let header = self
            .store
            .replace_canonical_invoice(&draft, &mapped.lines)
            .await?;
        tracing::debug!(
            "{} ({:?}) → canonical {} with {} lines",
            header.source_invoice_ref, candidate.kind, header.id, mapped.lines.len()
        );

        Ok(InvoiceOutcome::Processed(mapped.lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{
        CandidateKind, CanonicalInvoiceLineItem, CanonicalSource, LegacyLink, LegacyOcrInvoice,
        LegacySourceKind, LegacyXeroInvoice, ManualLineItem, QualityStatus, ScanScope,
        SourceSelector, XeroLineItem,
    };
    use crate::service::mapping::map_ocr_invoice;
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn scope() -> ScanScope {
        ScanScope::new("org-1", "loc-1")
    }

    fn request(source: SourceSelector, limit: u32) -> BackfillRequest {
        BackfillRequest::new(scope(), source, Some(limit)).unwrap()
    }

    fn ocr(id: &str, minute: u32) -> LegacyOcrInvoice {
        LegacyOcrInvoice {
            id: id.to_string(),
            organisation_id: "org-1".to_string(),
            location_id: Some("loc-1".to_string()),
            supplier_id: Some("sup-1".to_string()),
            invoice_date: None,
            currency_code: Some("AUD".to_string()),
            is_verified: false,
            ocr_result: Some(json!({
                "lineItems": [
                    {"description": "Ham Leg 2kg", "quantity": 1, "amount": 10},
                    {"description": "Olive oil", "unit": "litre", "quantity": 2, "unitPrice": 8}
                ]
            })),
            manual_lines: Vec::new(),
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, minute, 0).unwrap(),
        }
    }

    fn xero(id: &str, credit: bool) -> LegacyXeroInvoice {
        LegacyXeroInvoice {
            id: id.to_string(),
            organisation_id: "org-1".to_string(),
            location_id: Some("loc-1".to_string()),
            supplier_id: None,
            invoice_date: None,
            currency_code: Some("AUD".to_string()),
            is_credit_note: credit,
            line_items: vec![XeroLineItem {
                id: format!("{id}-l1"),
                line_number: 1,
                description: Some("Flour 25kg".to_string()),
                quantity: Some(BigDecimal::from(if credit { -1 } else { 1 })),
                unit_amount: Some(BigDecimal::from(30)),
                line_amount: Some(BigDecimal::from(if credit { -30 } else { 30 })),
                tax_amount: Some(BigDecimal::from(3)),
                item_code: Some("FL25".to_string()),
            }],
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        }
    }

    /// 模拟历史状态：按当前规则写入完整规范发票，或只写发票头
    fn seed(store: &InMemoryStore, invoice: &LegacyOcrInvoice, with_lines: bool) {
        let mapped = map_ocr_invoice(invoice).unwrap();
        let header = HeaderDraft {
            organisation_id: mapped.organisation_id,
            location_id: "loc-1".to_string(),
            supplier_id: mapped.supplier_id,
            source: mapped.source,
            legacy_link: LegacyLink::Ocr(invoice.id.clone()),
            date: mapped.date,
            currency_code: mapped.currency_code,
            deleted_at: None,
        }
        .into_header(LegacyLink::Ocr(invoice.id.clone()).header_id());
        let lines = if with_lines {
            mapped
                .lines
                .into_iter()
                .map(|line| CanonicalInvoiceLineItem::from_draft(&header, line))
                .collect()
        } else {
            Vec::new()
        };
        store.seed_canonical(header, lines);
    }

    #[tokio::test]
    async fn repairs_new_and_orphaned_invoices_only() {
        let store = Arc::new(InMemoryStore::new());
        let fresh = ocr("inv-new", 1);
        let orphaned = ocr("inv-orphan", 2);
        let clean = ocr("inv-clean", 3);
        for inv in [&fresh, &orphaned, &clean] {
            store.insert_ocr_invoice(inv.clone());
        }
        seed(&store, &orphaned, false);
        seed(&store, &clean, true);
        let clean_lines_before = store.lines(&LegacyLink::Ocr("inv-clean".into()));

        let scanner = ReconciliationScanner::new(store.as_ref());
        let candidates = scanner
            .scan_source(&scope(), LegacySourceKind::Ocr, 10)
            .await
            .unwrap();
        let found: Vec<(&str, CandidateKind)> = candidates
            .iter()
            .map(|c| (c.legacy_id.as_str(), c.kind))
            .collect();
        assert_eq!(
            found,
            vec![("inv-new", CandidateKind::New), ("inv-orphan", CandidateKind::Repair)]
        );

        let service = BackfillService::new(store.clone());
        let mut events = Vec::new();
        let result = service
            .run(&request(SourceSelector::Ocr, 10), |p| events.push(p))
            .await
            .unwrap();

        assert_eq!(result.invoices_processed, 2);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.lines_processed, 4);
        assert_eq!(result.ok_lines, 4);
        assert_eq!(result.warn_rate, 0.0);
        assert_eq!(store.lines(&LegacyLink::Ocr("inv-orphan".into())).len(), 2);
        assert_eq!(store.lines(&LegacyLink::Ocr("inv-clean".into())), clean_lines_before);

        assert!(matches!(events.first(), Some(BackfillProgress::ScanStarted { limit: 10, .. })));
        assert!(events.contains(&BackfillProgress::SourceScanned {
            source: LegacySourceKind::Ocr,
            new: 1,
            repair: 1,
            rebuild: 0,
        }));
        assert_eq!(events.last(), Some(&BackfillProgress::Completed(result)));
    }

    fn snapshot(store: &InMemoryStore) -> Vec<Vec<CanonicalInvoiceLineItem>> {
        ["inv-1", "inv-2"]
            .iter()
            .map(|id| store.lines(&LegacyLink::Ocr(id.to_string())))
            .chain(std::iter::once(store.lines(&LegacyLink::Xero("x-1".into()))))
            .collect()
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_ocr_invoice(ocr("inv-1", 1));
        // 套装写法按当前规则无法解析单位，保留 WARN 但不再重建
        let mut unresolved = ocr("inv-2", 2);
        unresolved.ocr_result = Some(json!({
            "lineItems": [{"description": "Chicken 2 x 2.5kg", "quantity": 2, "amount": 20}]
        }));
        store.insert_ocr_invoice(unresolved);
        store.insert_xero_invoice(xero("x-1", false));

        let service = BackfillService::new(store.clone());
        let first = service.run(&request(SourceSelector::All, 50), |_| {}).await.unwrap();
        assert_eq!(first.invoices_processed, 3);
        assert_eq!(first.warn_lines, 1);

        let before = snapshot(&store);
        let headers = store.header_count();

        let scanner = ReconciliationScanner::new(store.as_ref());
        for source in [LegacySourceKind::Ocr, LegacySourceKind::Xero] {
            let again = scanner.scan_source(&scope(), source, 50).await.unwrap();
            assert!(again.is_empty(), "{again:?}");
        }

        let second = service.run(&request(SourceSelector::All, 50), |_| {}).await.unwrap();
        assert_eq!(second.invoices_processed, 0);
        assert_eq!(second.lines_processed, 0);
        assert_eq!(store.header_count(), headers);
        assert_eq!(snapshot(&store), before);
    }

    #[tokio::test]
    async fn unresolved_oldest_invoices_do_not_starve_newer_ones() {
        let store = Arc::new(InMemoryStore::new());
        for (id, minute) in [("inv-a", 1), ("inv-b", 2)] {
            let mut packed = ocr(id, minute);
            packed.ocr_result = Some(json!({
                "lineItems": [{"description": "Chicken 2 x 2.5kg", "quantity": 2, "amount": 20}]
            }));
            store.insert_ocr_invoice(packed);
        }
        store.insert_ocr_invoice(ocr("inv-c", 3));

        let service = BackfillService::new(store.clone());
        let first = service.run(&request(SourceSelector::Ocr, 2), |_| {}).await.unwrap();
        assert_eq!(first.invoices_processed, 2);
        assert!(store.header(&LegacyLink::Ocr("inv-c".into())).is_none());

        let second = service.run(&request(SourceSelector::Ocr, 2), |_| {}).await.unwrap();
        assert_eq!(second.invoices_processed, 1);
        assert_eq!(store.lines(&LegacyLink::Ocr("inv-c".into())).len(), 2);

        let third = service.run(&request(SourceSelector::Ocr, 2), |_| {}).await.unwrap();
        assert_eq!(third.invoices_processed, 0);
    }

    #[tokio::test]
    async fn stale_unknown_unit_lines_are_rebuilt_once() {
        let store = Arc::new(InMemoryStore::new());
        let mut ham = ocr("inv-ham", 1);
        ham.ocr_result = Some(json!({
            "lineItems": [{"description": "Ham Leg 2kg", "quantity": 1, "amount": 10}]
        }));
        store.insert_ocr_invoice(ham.clone());

        // 旧规则版本写入的行：单位未识别
        seed(&store, &ham, false);
        let link = LegacyLink::Ocr("inv-ham".into());
        let header = store.header(&link).unwrap();
        let mut line = map_ocr_invoice(&ham).unwrap().lines.remove(0);
        line.unit_label = None;
        line.unit_category = crate::models::UnitCategory::Unknown;
        line.quality_status = QualityStatus::Warn;
        line.warn_reasons = vec!["UNKNOWN_UNIT_CATEGORY".to_string()];
        let mut stale = CanonicalInvoiceLineItem::from_draft(&header, line);
        stale.normalization_version = "units-v0".to_string();
        store.seed_canonical(header, vec![stale]);

        let scanner = ReconciliationScanner::new(store.as_ref());
        let found = scanner.scan_source(&scope(), LegacySourceKind::Ocr, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CandidateKind::Rebuild);

        let service = BackfillService::new(store.clone());
        let result = service.run(&request(SourceSelector::Ocr, 10), |_| {}).await.unwrap();
        assert_eq!(result.invoices_processed, 1);
        assert_eq!(result.ok_lines, 1);

        let lines = store.lines(&link);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].normalization_version, crate::models::NORMALIZATION_VERSION);
        assert_eq!(lines[0].line.unit_label.as_deref(), Some("KG"));
        assert_eq!(lines[0].line.unit_category, crate::models::UnitCategory::Weight);
        assert_eq!(lines[0].line.quality_status, QualityStatus::Ok);
        assert!(lines[0].line.warn_reasons.is_empty());

        let again = scanner.scan_source(&scope(), LegacySourceKind::Ocr, 10).await.unwrap();
        assert!(again.is_empty(), "{again:?}");
    }

    #[tokio::test]
    async fn invoices_without_lines_write_no_header() {
        let store = Arc::new(InMemoryStore::new());
        let mut empty = ocr("inv-empty", 1);
        empty.ocr_result = None;
        store.insert_ocr_invoice(empty);
        let mut blank_items = ocr("inv-blank", 2);
        blank_items.ocr_result = Some(json!({"lineItems": []}));
        store.insert_ocr_invoice(blank_items);
        let mut bare_xero = xero("x-empty", false);
        bare_xero.line_items.clear();
        store.insert_xero_invoice(bare_xero);

        let scanner = ReconciliationScanner::new(store.as_ref());
        for source in [LegacySourceKind::Ocr, LegacySourceKind::Xero] {
            let found = scanner.scan_source(&scope(), source, 10).await.unwrap();
            assert!(found.is_empty(), "{found:?}");
        }

        let service = BackfillService::new(store.clone());
        let candidate = Candidate {
            source: LegacySourceKind::Ocr,
            legacy_id: "inv-empty".to_string(),
            kind: CandidateKind::New,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        };
        assert_eq!(
            service.process_candidate(&candidate).await.unwrap(),
            InvoiceOutcome::Skipped(SkipReason::NoLineItems)
        );

        let result = service.run(&request(SourceSelector::All, 10), |_| {}).await.unwrap();
        assert_eq!(result.invoices_processed, 0);
        assert_eq!(store.header_count(), 0);
    }

    #[tokio::test]
    async fn one_failing_invoice_does_not_stop_the_batch() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_ocr_invoice(ocr("inv-1", 1));
        store.insert_ocr_invoice(ocr("inv-2", 2));
        store.insert_ocr_invoice(ocr("inv-3", 3));
        store.fail_writes_for(LegacyLink::Ocr("inv-2".into()), "connection reset");

        let service = BackfillService::new(store.clone());
        let mut events = Vec::new();
        let err = service
            .run(&request(SourceSelector::Ocr, 10), |p| events.push(p))
            .await
            .unwrap_err();

        let BackfillError::BatchFailed { failures, partial } = err else {
            panic!("expected batch failure, got {err:?}");
        };
        assert!(events.contains(&BackfillProgress::SourceCompleted {
            source: LegacySourceKind::Ocr,
            invoices_processed: 2,
            skipped: 0,
            failed: 1,
        }));
        assert_eq!(events.last(), Some(&BackfillProgress::Completed(partial.clone())));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].legacy_id, "inv-2");
        assert!(failures[0].message.contains("connection reset"));
        assert_eq!(partial.invoices_processed, 2);
        assert!(store.header(&LegacyLink::Ocr("inv-1".into())).is_some());
        assert!(store.header(&LegacyLink::Ocr("inv-2".into())).is_none());
        assert!(store.header(&LegacyLink::Ocr("inv-3".into())).is_some());
    }

    #[tokio::test]
    async fn blank_legacy_id_violates_the_guard() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_ocr_invoice(ocr("   ", 1));
        store.insert_ocr_invoice(ocr("inv-ok", 2));

        let service = BackfillService::new(store.clone());
        let err = service
            .run(&request(SourceSelector::Ocr, 10), |_| {})
            .await
            .unwrap_err();
        let BackfillError::BatchFailed { failures, partial } = err else {
            panic!("expected batch failure, got {err:?}");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("no legacy pointer"), "{}", failures[0].message);
        assert_eq!(partial.invoices_processed, 1);
        assert_eq!(store.header_count(), 1);
    }

    #[tokio::test]
    async fn missing_or_unlocated_invoices_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let mut unlocated = ocr("inv-nowhere", 1);
        unlocated.location_id = None;
        store.insert_ocr_invoice(unlocated);

        let service = BackfillService::new(store.clone());
        let candidate = |id: &str| Candidate {
            source: LegacySourceKind::Ocr,
            legacy_id: id.to_string(),
            kind: CandidateKind::New,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        };

        assert_eq!(
            service.process_candidate(&candidate("inv-nowhere")).await.unwrap(),
            InvoiceOutcome::Skipped(SkipReason::MissingLocation)
        );
        assert_eq!(
            service.process_candidate(&candidate("inv-gone")).await.unwrap(),
            InvoiceOutcome::Skipped(SkipReason::LegacyInvoiceMissing)
        );
        assert_eq!(store.header_count(), 0);
    }

    #[tokio::test]
    async fn xero_credit_notes_keep_tax_and_credit_status() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_xero_invoice(xero("x-credit", true));

        let service = BackfillService::new(store.clone());
        let result = service.run(&request(SourceSelector::Xero, 10), |_| {}).await.unwrap();
        assert_eq!(result.invoices_processed, 1);

        let link = LegacyLink::Xero("x-credit".into());
        let header = store.header(&link).unwrap();
        assert_eq!(header.source, CanonicalSource::Xero);
        assert_eq!(header.source_invoice_ref, "xero:x-credit");
        let lines = store.lines(&link);
        assert_eq!(lines[0].line.tax_amount, Some(BigDecimal::from(3)));
        assert_eq!(lines[0].line.source_line_ref, "xero:x-credit-l1");
        assert_eq!(lines[0].line.adjustment_status, crate::models::AdjustmentStatus::Credited);
        // 负数量仍会告警，贷记只豁免缺失数量与负金额
        assert_eq!(lines[0].line.quality_status, QualityStatus::Warn);
        assert!(!lines[0]
            .line
            .warn_reasons
            .iter()
            .any(|r| r == "NEGATIVE_LINE_TOTAL_NOT_CREDITED"));
    }

    #[tokio::test]
    async fn manual_lines_take_precedence_over_ocr() {
        let store = Arc::new(InMemoryStore::new());
        let mut edited = ocr("inv-edited", 1);
        edited.manual_lines = vec![ManualLineItem {
            id: "ml-1".to_string(),
            line_number: 1,
            description: Some("Butter 500g".to_string()),
            quantity: Some(BigDecimal::from(4)),
            unit: None,
            unit_price: Some(BigDecimal::from(3)),
            line_total: Some(BigDecimal::from(12)),
            product_code: None,
            currency_code: None,
            adjustment_status: Some("MODIFIED".to_string()),
        }];
        store.insert_ocr_invoice(edited);

        let service = BackfillService::new(store.clone());
        service.run(&request(SourceSelector::All, 10), |_| {}).await.unwrap();

        let link = LegacyLink::Ocr("inv-edited".into());
        assert_eq!(store.header(&link).unwrap().source, CanonicalSource::Manual);
        let lines = store.lines(&link);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line.source, CanonicalSource::Manual);
        assert_eq!(lines[0].line.unit_label.as_deref(), Some("G"));
        assert_eq!(lines[0].line.quality_status, QualityStatus::Ok);
    }

    #[tokio::test]
    async fn cancellation_stops_between_invoices() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_ocr_invoice(ocr("inv-1", 1));
        store.insert_ocr_invoice(ocr("inv-2", 2));

        let flag = Arc::new(AtomicBool::new(false));
        let service = BackfillService::new(store.clone()).with_cancel_flag(flag.clone());
        let result = service
            .run(&request(SourceSelector::All, 10), |p| {
                if matches!(p, BackfillProgress::SourceScanned { .. }) {
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.invoices_processed, 0);
        assert_eq!(store.header_count(), 0);
    }
}
