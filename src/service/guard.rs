use crate::error::LegacyLinkError;
use crate::models::{CanonicalSource, LegacyLink};

fn present(pointer: Option<&str>) -> Option<&str> {
    pointer.filter(|id| !id.trim().is_empty())
}

/// 旧指针不变式：恰好一个指针非空，且与来源匹配
///
/// OCR / MANUAL 使用 `legacy_invoice_id`，XERO 使用 `legacy_xero_invoice_id`。
/// 空白字符串按空值处理。违反时返回错误，只终止当前发票。
pub fn resolve_legacy_link(
    source: CanonicalSource,
    legacy_invoice_id: Option<&str>,
    legacy_xero_invoice_id: Option<&str>,
) -> Result<LegacyLink, LegacyLinkError> {
    match (present(legacy_invoice_id), present(legacy_xero_invoice_id)) {
        (None, None) => Err(LegacyLinkError::NoPointer { origin: source }),
        (Some(invoice_id), Some(xero_invoice_id)) => Err(LegacyLinkError::BothPointers {
            origin: source,
            invoice_id: invoice_id.to_string(),
            xero_invoice_id: xero_invoice_id.to_string(),
        }),
        (Some(id), None) => match source {
            CanonicalSource::Ocr | CanonicalSource::Manual => Ok(LegacyLink::Ocr(id.to_string())),
            CanonicalSource::Xero => Err(LegacyLinkError::WrongPointer {
                origin: source,
                column: "legacy_invoice_id",
                id: id.to_string(),
            }),
        },
        (None, Some(id)) => match source {
            CanonicalSource::Xero => Ok(LegacyLink::Xero(id.to_string())),
            CanonicalSource::Ocr | CanonicalSource::Manual => Err(LegacyLinkError::WrongPointer {
                origin: source,
                column: "legacy_xero_invoice_id",
                id: id.to_string(),
            }),
        },
    }
}
