use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 规范化规则集版本，写入每一条规范行
///
/// 单位提取采用"排除装箱写法"策略 (`2 x 2.5kg` 不提取单位)。
/// 同一语料内不得混用不同策略产生的行。
pub const NORMALIZATION_VERSION: &str = "units-v1-pack-excluded";

/// 规范记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanonicalSource {
    Ocr,
    Xero,
    Manual,
}

impl CanonicalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalSource::Ocr => "OCR",
            CanonicalSource::Xero => "XERO",
            CanonicalSource::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitCategory {
    Weight,
    Volume,
    Unit,
    Unknown,
}

impl UnitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitCategory::Weight => "WEIGHT",
            UnitCategory::Volume => "VOLUME",
            UnitCategory::Unit => "UNIT",
            UnitCategory::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityStatus {
    Ok,
    Warn,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Ok => "OK",
            QualityStatus::Warn => "WARN",
        }
    }
}

/// 行调整状态：普通 / 人工修改 / 贷记(退款)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustmentStatus {
    #[default]
    None,
    Modified,
    Credited,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::None => "NONE",
            AdjustmentStatus::Modified => "MODIFIED",
            AdjustmentStatus::Credited => "CREDITED",
        }
    }
}

/// 枚举文本无法识别
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} value '{value}'")]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! impl_from_str {
    ($ty:ty, $kind:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == upper)
                    .ok_or_else(|| EnumParseError { kind: $kind, value: s.to_string() })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_from_str!(CanonicalSource, "source", [CanonicalSource::Ocr, CanonicalSource::Xero, CanonicalSource::Manual]);
impl_from_str!(UnitCategory, "unit category", [UnitCategory::Weight, UnitCategory::Volume, UnitCategory::Unit, UnitCategory::Unknown]);
impl_from_str!(QualityStatus, "quality status", [QualityStatus::Ok, QualityStatus::Warn]);
impl_from_str!(AdjustmentStatus, "adjustment status", [AdjustmentStatus::None, AdjustmentStatus::Modified, AdjustmentStatus::Credited]);

/// 规范发票指向的旧记录 (恰好一个指针)
///
/// 表结构上是两个可空列 `legacy_invoice_id` / `legacy_xero_invoice_id`，
/// 只能通过 [`crate::service::guard::resolve_legacy_link`] 构造。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum LegacyLink {
    Ocr(String),
    Xero(String),
}

impl LegacyLink {
    pub fn legacy_invoice_id(&self) -> Option<&str> {
        match self {
            LegacyLink::Ocr(id) => Some(id),
            LegacyLink::Xero(_) => None,
        }
    }

    pub fn legacy_xero_invoice_id(&self) -> Option<&str> {
        match self {
            LegacyLink::Xero(id) => Some(id),
            LegacyLink::Ocr(_) => None,
        }
    }

    /// 调试用引用串，如 `ocr:inv-001`
    pub fn source_ref(&self) -> String {
        match self {
            LegacyLink::Ocr(id) => format!("ocr:{id}"),
            LegacyLink::Xero(id) => format!("xero:{id}"),
        }
    }

    /// 由旧指针派生的稳定头 ID
    pub fn header_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.source_ref().as_bytes())
    }
}

/// 规范行 ID：同一头下按行号稳定派生，重建后保持不变
pub fn line_id(header_id: Uuid, line_number: i32) -> Uuid {
    Uuid::new_v5(&header_id, &line_number.to_be_bytes())
}

/// 规范发票头
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInvoiceHeader {
    pub id: Uuid,
    pub organisation_id: String,
    pub location_id: String,
    pub supplier_id: Option<String>,
    pub source: CanonicalSource,
    pub legacy_link: LegacyLink,
    pub source_invoice_ref: String,
    pub date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 待写入的发票头 (由执行器构造，ID 由存储层分配)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderDraft {
    pub organisation_id: String,
    pub location_id: String,
    pub supplier_id: Option<String>,
    pub source: CanonicalSource,
    pub legacy_link: LegacyLink,
    pub date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl HeaderDraft {
    /// 新建时的完整发票头
    pub fn into_header(self, id: Uuid) -> CanonicalInvoiceHeader {
        CanonicalInvoiceHeader {
            id,
            source_invoice_ref: self.legacy_link.source_ref(),
            organisation_id: self.organisation_id,
            location_id: self.location_id,
            supplier_id: self.supplier_id,
            source: self.source,
            legacy_link: self.legacy_link,
            date: self.date,
            currency_code: self.currency_code,
            deleted_at: self.deleted_at,
        }
    }

    /// 更新已有发票头：只刷新可能漂移的字段，旧指针不动
    pub fn refresh(&self, existing: &mut CanonicalInvoiceHeader) {
        existing.supplier_id = self.supplier_id.clone();
        existing.source = self.source;
        existing.date = self.date;
        existing.deleted_at = self.deleted_at;
    }
}

/// 待写入的规范行 (尚未分配头 ID)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    pub line_number: i32,
    pub source: CanonicalSource,
    pub source_line_ref: String,
    pub raw_description: String,
    pub raw_quantity: Option<String>,
    pub raw_unit_label: Option<String>,
    pub raw_unit_price: Option<String>,
    pub raw_line_total: Option<String>,
    pub raw_product_code: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub line_total: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub normalized_description: String,
    pub unit_label: Option<String>,
    pub unit_category: UnitCategory,
    pub currency_code: Option<String>,
    pub adjustment_status: AdjustmentStatus,
    pub quality_status: QualityStatus,
    pub warn_reasons: Vec<String>,
    pub confidence_score: Option<f64>,
}

/// 规范发票行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInvoiceLineItem {
    pub id: Uuid,
    pub canonical_invoice_id: Uuid,
    pub organisation_id: String,
    pub location_id: String,
    pub supplier_id: Option<String>,
    pub normalization_version: String,
    #[serde(flatten)]
    pub line: LineDraft,
}

impl CanonicalInvoiceLineItem {
    pub fn from_draft(header: &CanonicalInvoiceHeader, line: LineDraft) -> Self {
        Self {
            id: line_id(header.id, line.line_number),
            canonical_invoice_id: header.id,
            organisation_id: header.organisation_id.clone(),
            location_id: header.location_id.clone(),
            supplier_id: header.supplier_id.clone(),
            normalization_version: NORMALIZATION_VERSION.to_string(),
            line,
        }
    }
}
