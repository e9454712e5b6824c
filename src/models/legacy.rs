use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 旧记录来源 (每个来源走不同的旧指针列，独立扫描)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegacySourceKind {
    Ocr,
    Xero,
}

impl LegacySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegacySourceKind::Ocr => "OCR",
            LegacySourceKind::Xero => "XERO",
        }
    }
}

impl std::fmt::Display for LegacySourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OCR 识别发票 (旧读模型)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyOcrInvoice {
    pub id: String,
    pub organisation_id: String,
    pub location_id: Option<String>,
    pub supplier_id: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    /// 人工核对/编辑过：以人工行为准
    pub is_verified: bool,
    /// 原始识别结果，按 `parse_extracted_document` 约定解析
    pub ocr_result: Option<serde_json::Value>,
    pub manual_lines: Vec<ManualLineItem>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 人工录入/修改的发票行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ManualLineItem {
    pub id: String,
    pub line_number: i32,
    pub description: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit: Option<String>,
    pub unit_price: Option<BigDecimal>,
    pub line_total: Option<BigDecimal>,
    pub product_code: Option<String>,
    pub currency_code: Option<String>,
    pub adjustment_status: Option<String>,
}

/// 会计系统同步的发票 (旧读模型)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyXeroInvoice {
    pub id: String,
    pub organisation_id: String,
    pub location_id: Option<String>,
    pub supplier_id: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    /// 贷项通知单 (ACCPAYCREDIT)
    pub is_credit_note: bool,
    pub line_items: Vec<XeroLineItem>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct XeroLineItem {
    pub id: String,
    pub line_number: i32,
    pub description: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_amount: Option<BigDecimal>,
    pub line_amount: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub item_code: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LegacyInvoice {
    Ocr(LegacyOcrInvoice),
    Xero(LegacyXeroInvoice),
}

impl LegacyInvoice {
    pub fn location_id(&self) -> Option<&str> {
        match self {
            LegacyInvoice::Ocr(inv) => inv.location_id.as_deref(),
            LegacyInvoice::Xero(inv) => inv.location_id.as_deref(),
        }
    }
}
