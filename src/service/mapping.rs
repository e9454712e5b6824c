//! 旧发票 → 规范发票草稿的来源映射
//!
//! OCR 发票：有人工核对/编辑的行时取人工行 (MANUAL)，否则解析识别结果 (OCR)。
//! 会计系统发票：直接取同步行，额外带税额。
//! 所有行都经过 [`canonicalize_line`] 编译。

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::BackfillError;
use crate::ingest::{parse_extracted_document, ExtractedLineItem};
use crate::models::{
    AdjustmentStatus, CanonicalSource, LegacyOcrInvoice, LegacyXeroInvoice, LineDraft,
    ManualLineItem, XeroLineItem,
};
use crate::normalize::{canonicalize_line, normalize_currency_code, LineInput, NumericParse};

/// 映射结果：两个旧指针仍是可空字段，写入前必须经过旧指针校验
#[derive(Debug, Clone)]
pub struct MappedInvoice {
    pub source: CanonicalSource,
    pub legacy_invoice_id: Option<String>,
    pub legacy_xero_invoice_id: Option<String>,
    pub organisation_id: String,
    pub supplier_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub lines: Vec<LineDraft>,
}

/// 编译前的单行原始数据
struct RawLine {
    line_number: i32,
    source: CanonicalSource,
    source_line_ref: String,
    description: String,
    unit: Option<String>,
    product_code: Option<String>,
    currency_code: Option<String>,
    raw_quantity: Option<String>,
    raw_unit_price: Option<String>,
    raw_line_total: Option<String>,
    quantity: Option<BigDecimal>,
    unit_price: Option<BigDecimal>,
    line_total: Option<BigDecimal>,
    tax_amount: Option<BigDecimal>,
    adjustment_status: Option<AdjustmentStatus>,
    numeric_parse: NumericParse,
    confidence: Option<f64>,
}

impl RawLine {
    fn compile(self, header_currency: Option<&str>) -> LineDraft {
        let compiled = canonicalize_line(&LineInput {
            raw_description: &self.description,
            unit_label: self.unit.as_deref(),
            quantity: self.quantity.as_ref(),
            unit_price: self.unit_price.as_ref(),
            line_total: self.line_total.as_ref(),
            currency_code: self.currency_code.as_deref(),
            header_currency_code: header_currency,
            adjustment_status: self.adjustment_status,
            numeric_parse: self.numeric_parse.clone(),
        });

        LineDraft {
            line_number: self.line_number,
            source: self.source,
            source_line_ref: self.source_line_ref,
            raw_description: compiled.raw_description,
            raw_quantity: self.raw_quantity,
            raw_unit_label: self.unit,
            raw_unit_price: self.raw_unit_price,
            raw_line_total: self.raw_line_total,
            raw_product_code: self.product_code,
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_total: self.line_total,
            tax_amount: self.tax_amount,
            normalized_description: compiled.normalized_description,
            unit_label: compiled.unit_label,
            unit_category: compiled.unit_category,
            currency_code: compiled.currency_code,
            adjustment_status: compiled.adjustment_status,
            quality_status: compiled.quality_status,
            warn_reasons: compiled.quality_warn_reasons,
            confidence_score: self.confidence,
        }
    }
}

fn decimal_text(value: &Option<BigDecimal>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn line_number(idx: usize) -> i32 {
    i32::try_from(idx + 1).unwrap_or(i32::MAX)
}

/// OCR 发票是否有可映射的行来源
///
/// 没有行来源的发票不进入扫描，执行时也直接跳过，避免写出无行的发票头。
/// 结构不合法的识别结果算作有来源，让失败在执行时暴露。
pub fn ocr_has_line_sources(invoice: &LegacyOcrInvoice) -> bool {
    if !invoice.manual_lines.is_empty() {
        return true;
    }
    match &invoice.ocr_result {
        None => false,
        Some(raw) => parse_extracted_document(raw).map_or(true, |doc| !doc.line_items.is_empty()),
    }
}

pub fn xero_has_line_sources(invoice: &LegacyXeroInvoice) -> bool {
    !invoice.line_items.is_empty()
}

/// OCR 发票映射
///
/// 有人工行时以人工行为准 (MANUAL)；已核对但没有人工行的发票退回识别结果。
pub fn map_ocr_invoice(invoice: &LegacyOcrInvoice) -> Result<MappedInvoice, BackfillError> {
    let use_manual = !invoice.manual_lines.is_empty();
    if invoice.is_verified && !use_manual {
        tracing::debug!("Invoice {} is verified but has no manual lines, using extracted lines", invoice.id);
    }

    let document = match (&invoice.ocr_result, use_manual) {
        (Some(raw), false) => Some(parse_extracted_document(raw).map_err(|source| {
            BackfillError::Document {
                invoice_id: invoice.id.clone(),
                source,
            }
        })?),
        // 人工行优先；识别结果只用来补头币种，解析失败不影响人工行
        (Some(raw), true) => parse_extracted_document(raw).ok(),
        (None, _) => None,
    };

    let header_currency = normalize_currency_code(
        invoice
            .currency_code
            .as_deref()
            .or_else(|| document.as_ref().and_then(|d| d.currency_code.as_deref())),
    );

    let (source, raw_lines): (CanonicalSource, Vec<RawLine>) = if use_manual {
        let lines = invoice
            .manual_lines
            .iter()
            .enumerate()
            .map(|(idx, line)| manual_raw_line(&invoice.id, idx, line))
            .collect();
        (CanonicalSource::Manual, lines)
    } else {
        let lines = document
            .map(|doc| {
                doc.line_items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| extracted_raw_line(&invoice.id, idx, item))
                    .collect()
            })
            .unwrap_or_default();
        (CanonicalSource::Ocr, lines)
    };

    Ok(MappedInvoice {
        source,
        legacy_invoice_id: Some(invoice.id.clone()),
        legacy_xero_invoice_id: None,
        organisation_id: invoice.organisation_id.clone(),
        supplier_id: invoice.supplier_id.clone(),
        date: invoice.invoice_date,
        lines: raw_lines
            .into_iter()
            .map(|line| line.compile(header_currency.as_deref()))
            .collect(),
        currency_code: header_currency,
        deleted_at: invoice.deleted_at,
    })
}

fn extracted_raw_line(invoice_id: &str, idx: usize, item: ExtractedLineItem) -> RawLine {
    let number = line_number(idx);
    RawLine {
        line_number: number,
        source: CanonicalSource::Ocr,
        source_line_ref: format!("ocr:{invoice_id}:{number}"),
        description: item.description,
        unit: item.unit,
        product_code: item.product_code,
        currency_code: item.currency_code,
        raw_quantity: item.raw_quantity,
        raw_unit_price: item.raw_unit_price,
        raw_line_total: item.raw_line_total,
        quantity: item.quantity,
        unit_price: item.unit_price,
        line_total: item.line_total,
        tax_amount: None,
        adjustment_status: None,
        numeric_parse: item.numeric_parse,
        confidence: item.confidence,
    }
}

fn manual_raw_line(invoice_id: &str, idx: usize, line: &ManualLineItem) -> RawLine {
    let adjustment_status = line.adjustment_status.as_deref().and_then(|raw| {
        raw.parse::<AdjustmentStatus>()
            .map_err(|e| tracing::warn!("Invoice {} manual line {}: {}", invoice_id, line.id, e))
            .ok()
    });
    RawLine {
        line_number: line_number(idx),
        source: CanonicalSource::Manual,
        source_line_ref: format!("manual:{}", line.id),
        description: line.description.clone().unwrap_or_default(),
        unit: line.unit.clone(),
        product_code: line.product_code.clone(),
        currency_code: line.currency_code.clone(),
        raw_quantity: decimal_text(&line.quantity),
        raw_unit_price: decimal_text(&line.unit_price),
        raw_line_total: decimal_text(&line.line_total),
        quantity: line.quantity.clone(),
        unit_price: line.unit_price.clone(),
        line_total: line.line_total.clone(),
        tax_amount: None,
        adjustment_status,
        numeric_parse: NumericParse::clean(),
        confidence: None,
    }
}

/// 会计系统发票映射；贷项通知单的所有行记为 CREDITED
pub fn map_xero_invoice(invoice: &LegacyXeroInvoice) -> MappedInvoice {
    let header_currency = normalize_currency_code(invoice.currency_code.as_deref());
    let adjustment_status = if invoice.is_credit_note {
        AdjustmentStatus::Credited
    } else {
        AdjustmentStatus::None
    };

    let lines = invoice
        .line_items
        .iter()
        .enumerate()
        .map(|(idx, line)| xero_raw_line(idx, line, adjustment_status))
        .map(|line| line.compile(header_currency.as_deref()))
        .collect();

    MappedInvoice {
        source: CanonicalSource::Xero,
        legacy_invoice_id: None,
        legacy_xero_invoice_id: Some(invoice.id.clone()),
        organisation_id: invoice.organisation_id.clone(),
        supplier_id: invoice.supplier_id.clone(),
        date: invoice.invoice_date,
        currency_code: header_currency,
        deleted_at: invoice.deleted_at,
        lines,
    }
}

fn xero_raw_line(idx: usize, line: &XeroLineItem, adjustment_status: AdjustmentStatus) -> RawLine {
    RawLine {
        line_number: line_number(idx),
        source: CanonicalSource::Xero,
        source_line_ref: format!("xero:{}", line.id),
        description: line.description.clone().unwrap_or_default(),
        unit: None,
        product_code: line.item_code.clone(),
        currency_code: None,
        raw_quantity: decimal_text(&line.quantity),
        raw_unit_price: decimal_text(&line.unit_amount),
        raw_line_total: decimal_text(&line.line_amount),
        quantity: line.quantity.clone(),
        unit_price: line.unit_amount.clone(),
        line_total: line.line_amount.clone(),
        tax_amount: line.tax_amount.clone(),
        adjustment_status: Some(adjustment_status),
        numeric_parse: NumericParse::clean(),
        confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QualityStatus, UnitCategory, WarnReason};
    use chrono::TimeZone;
    use serde_json::json;
    use std::str::FromStr;

    fn ocr_invoice(ocr_result: Option<serde_json::Value>) -> LegacyOcrInvoice {
        LegacyOcrInvoice {
            id: "inv-1".to_string(),
            organisation_id: "org-1".to_string(),
            location_id: Some("loc-1".to_string()),
            supplier_id: Some("sup-1".to_string()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 4, 2),
            currency_code: None,
            is_verified: false,
            ocr_result,
            manual_lines: Vec::new(),
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ocr_lines_come_from_extracted_document() {
        let invoice = ocr_invoice(Some(json!({
            "currencyCode": "aud",
            "lineItems": [
                {"description": "Ham Leg 2kg", "quantity": 1, "amount": 10, "confidence": 0.8},
                {"description": "Eggs", "quantity": "two", "amount": 6}
            ]
        })));
        let mapped = map_ocr_invoice(&invoice).unwrap();

        assert_eq!(mapped.source, CanonicalSource::Ocr);
        assert_eq!(mapped.legacy_invoice_id.as_deref(), Some("inv-1"));
        assert_eq!(mapped.legacy_xero_invoice_id, None);
        assert_eq!(mapped.currency_code.as_deref(), Some("AUD"));
        assert_eq!(mapped.lines.len(), 2);

        let ham = &mapped.lines[0];
        assert_eq!(ham.source_line_ref, "ocr:inv-1:1");
        assert_eq!(ham.unit_category, UnitCategory::Weight);
        assert_eq!(ham.currency_code.as_deref(), Some("AUD"));
        assert_eq!(ham.quality_status, QualityStatus::Ok);
        assert_eq!(ham.confidence_score, Some(0.8));

        let eggs = &mapped.lines[1];
        assert_eq!(eggs.raw_quantity.as_deref(), Some("two"));
        assert_eq!(eggs.quality_status, QualityStatus::Warn);
        assert!(eggs.warn_reasons.iter().any(|r| r == WarnReason::FailedNumericParse.code()));
        assert!(eggs.warn_reasons.iter().any(|r| r == "quantity: unparseable 'two'"));
    }

    #[test]
    fn verified_invoices_use_manual_lines() {
        let mut invoice = ocr_invoice(Some(json!({"currencyCode": "NZD", "lineItems": [{"description": "ignored"}]})));
        invoice.is_verified = true;
        invoice.manual_lines = vec![ManualLineItem {
            id: "ml-7".to_string(),
            line_number: 1,
            description: Some("Credit for damaged stock".to_string()),
            quantity: None,
            unit: None,
            unit_price: None,
            line_total: Some(BigDecimal::from(-12)),
            product_code: None,
            currency_code: None,
            adjustment_status: Some("credited".to_string()),
        }];

        let mapped = map_ocr_invoice(&invoice).unwrap();
        assert_eq!(mapped.source, CanonicalSource::Manual);
        assert_eq!(mapped.legacy_invoice_id.as_deref(), Some("inv-1"));
        assert_eq!(mapped.currency_code.as_deref(), Some("NZD"));
        assert_eq!(mapped.lines.len(), 1);
        let line = &mapped.lines[0];
        assert_eq!(line.source, CanonicalSource::Manual);
        assert_eq!(line.source_line_ref, "manual:ml-7");
        assert_eq!(line.adjustment_status, AdjustmentStatus::Credited);
        assert_eq!(line.quality_status, QualityStatus::Ok, "{:?}", line.warn_reasons);
    }

    #[test]
    fn verified_without_manual_lines_falls_back_to_document() {
        let mut invoice = ocr_invoice(Some(json!({
            "currencyCode": "AUD",
            "lineItems": [{"description": "Ham Leg 2kg", "quantity": 1, "amount": 10}]
        })));
        invoice.is_verified = true;

        let mapped = map_ocr_invoice(&invoice).unwrap();
        assert_eq!(mapped.source, CanonicalSource::Ocr);
        assert_eq!(mapped.lines.len(), 1);
        assert_eq!(mapped.lines[0].source, CanonicalSource::Ocr);
    }

    #[test]
    fn line_sources_decide_eligibility() {
        assert!(!ocr_has_line_sources(&ocr_invoice(None)));
        assert!(!ocr_has_line_sources(&ocr_invoice(Some(json!({"lineItems": []})))));
        assert!(!ocr_has_line_sources(&ocr_invoice(Some(json!({"supplier": "Acme"})))));
        assert!(ocr_has_line_sources(&ocr_invoice(Some(json!({"lineItems": [{"description": "Eggs"}]})))));
        // 结构不合法时仍然处理，让失败暴露出来
        assert!(ocr_has_line_sources(&ocr_invoice(Some(json!({"lineItems": "garbage"})))));

        let mut manual_only = ocr_invoice(None);
        manual_only.manual_lines = vec![ManualLineItem {
            id: "ml-1".to_string(),
            line_number: 1,
            description: Some("Eggs".to_string()),
            quantity: None,
            unit: None,
            unit_price: None,
            line_total: None,
            product_code: None,
            currency_code: None,
            adjustment_status: None,
        }];
        assert!(ocr_has_line_sources(&manual_only));
    }

    #[test]
    fn malformed_document_fails_the_invoice() {
        let invoice = ocr_invoice(Some(json!({"lineItems": "garbage"})));
        let err = map_ocr_invoice(&invoice).unwrap_err();
        assert!(matches!(err, BackfillError::Document { ref invoice_id, .. } if invoice_id == "inv-1"));
    }

    #[test]
    fn missing_document_maps_to_no_lines() {
        let mapped = map_ocr_invoice(&ocr_invoice(None)).unwrap();
        assert!(mapped.lines.is_empty());
        assert_eq!(mapped.currency_code, None);
    }

    #[test]
    fn xero_lines_carry_tax_and_credit_status() {
        let invoice = LegacyXeroInvoice {
            id: "x-1".to_string(),
            organisation_id: "org-1".to_string(),
            location_id: Some("loc-1".to_string()),
            supplier_id: None,
            invoice_date: None,
            currency_code: Some("aud".to_string()),
            is_credit_note: true,
            line_items: vec![XeroLineItem {
                id: "xl-1".to_string(),
                line_number: 1,
                description: Some("Returned olive oil 4L".to_string()),
                quantity: None,
                unit_amount: None,
                line_amount: Some(BigDecimal::from(-40)),
                tax_amount: Some(BigDecimal::from_str("-4.00").unwrap()),
                item_code: Some("OIL4".to_string()),
            }],
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap(),
        };

        let mapped = map_xero_invoice(&invoice);
        assert_eq!(mapped.source, CanonicalSource::Xero);
        assert_eq!(mapped.legacy_xero_invoice_id.as_deref(), Some("x-1"));
        let line = &mapped.lines[0];
        assert_eq!(line.tax_amount, Some(BigDecimal::from_str("-4.00").unwrap()));
        assert_eq!(line.raw_product_code.as_deref(), Some("OIL4"));
        assert_eq!(line.adjustment_status, AdjustmentStatus::Credited);
        assert_eq!(line.unit_category, UnitCategory::Volume);
        assert_eq!(line.currency_code.as_deref(), Some("AUD"));
        assert_eq!(line.quality_status, QualityStatus::Ok, "{:?}", line.warn_reasons);
    }
}
