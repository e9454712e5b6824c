use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::db::CanonicalStore;
use crate::error::ExportError;
use crate::models::{QualityStatus, ScanScope};

const HEADER: [&str; 12] = [
    "canonical_invoice_id",
    "line_number",
    "source",
    "source_line_ref",
    "normalized_description",
    "unit_label",
    "unit_category",
    "currency_code",
    "adjustment_status",
    "quality_status",
    "warn_reasons",
    "normalization_version",
];

/// 导出某门店的规范行质量报告 (CSV)，返回写出的行数
///
/// `warn_only` 为 true 时只导出 WARN 行。
pub async fn export_quality_report<S: CanonicalStore + ?Sized>(
    store: &S,
    scope: &ScanScope,
    output_path: &Path,
    warn_only: bool,
) -> Result<usize, ExportError> {
    let lines = store.list_canonical_lines(scope).await?;

    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);
    writer.write_record(HEADER)?;

    let mut written = 0;
    for item in &lines {
        let line = &item.line;
        if warn_only && line.quality_status != QualityStatus::Warn {
            continue;
        }
        writer.write_record([
            item.canonical_invoice_id.to_string(),
            line.line_number.to_string(),
            line.source.to_string(),
            line.source_line_ref.clone(),
            line.normalized_description.clone(),
            line.unit_label.clone().unwrap_or_default(),
            line.unit_category.to_string(),
            line.currency_code.clone().unwrap_or_default(),
            line.adjustment_status.to_string(),
            line.quality_status.to_string(),
            line.warn_reasons.join("|"),
            item.normalization_version.clone(),
        ])?;
        written += 1;
    }

    writer.flush()?;
    tracing::info!(
        "质量报告 {}/{}: {} 行写入 {}",
        scope.organisation_id,
        scope.location_id,
        written,
        output_path.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{BackfillRequest, LegacyLink, LegacyOcrInvoice, SourceSelector};
    use crate::service::BackfillService;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    async fn populated_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_ocr_invoice(LegacyOcrInvoice {
            id: "inv-1".to_string(),
            organisation_id: "org-1".to_string(),
            location_id: Some("loc-1".to_string()),
            supplier_id: None,
            invoice_date: None,
            currency_code: Some("AUD".to_string()),
            is_verified: false,
            ocr_result: Some(json!({
                "lineItems": [
                    {"description": "Ham Leg 2kg", "quantity": 1, "amount": 10},
                    {"description": "Chicken 2 x 2.5kg", "quantity": 2, "amount": 20}
                ]
            })),
            manual_lines: Vec::new(),
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        });
        let request = BackfillRequest::new(ScanScope::new("org-1", "loc-1"), SourceSelector::Ocr, None).unwrap();
        BackfillService::new(store.clone()).run(&request, |_| {}).await.unwrap();
        store
    }

    #[tokio::test]
    async fn writes_all_lines_with_header() {
        let store = populated_store().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality.csv");

        let written = export_quality_report(store.as_ref(), &ScanScope::new("org-1", "loc-1"), &path, false)
            .await
            .unwrap();
        assert_eq!(written, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), HEADER.to_vec());
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        let header_id = LegacyLink::Ocr("inv-1".into()).header_id().to_string();
        assert_eq!(&rows[0][0], header_id.as_str());
        assert_eq!(&rows[0][4], "ham leg 2kg");
        assert_eq!(&rows[0][5], "KG");
        assert_eq!(&rows[0][9], "OK");
        assert_eq!(&rows[1][6], "UNKNOWN");
        assert!(rows[1][10].split('|').any(|r| r == "UNKNOWN_UNIT_CATEGORY"));
    }

    #[tokio::test]
    async fn warn_only_filters_ok_lines() {
        let store = populated_store().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warn.csv");

        let written = export_quality_report(store.as_ref(), &ScanScope::new("org-1", "loc-1"), &path, true)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let other = dir.path().join("other.csv");
        let none = export_quality_report(store.as_ref(), &ScanScope::new("org-1", "loc-9"), &other, false)
            .await
            .unwrap();
        assert_eq!(none, 0);
    }
}
