use serde::{Deserialize, Serialize};
use std::fmt;

/// 质量门告警原因
///
/// 持久化为文本数组，上游数值解析告警以原文并入同一集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarnReason {
    FailedNumericParse,
    MissingQuantity,
    NonPositiveQuantity,
    NegativeLineTotalNotCredited,
    UnknownUnitCategory,
    InvalidCurrencyCode,
    MissingCurrencyCode,
    UnitPriceWithoutQuantity,
    MissingPriceFields,
}

impl WarnReason {
    pub fn code(&self) -> &'static str {
        match self {
            WarnReason::FailedNumericParse => "FAILED_NUMERIC_PARSE",
            WarnReason::MissingQuantity => "MISSING_QUANTITY",
            WarnReason::NonPositiveQuantity => "NON_POSITIVE_QUANTITY",
            WarnReason::NegativeLineTotalNotCredited => "NEGATIVE_LINE_TOTAL_NOT_CREDITED",
            WarnReason::UnknownUnitCategory => "UNKNOWN_UNIT_CATEGORY",
            WarnReason::InvalidCurrencyCode => "INVALID_CURRENCY_CODE",
            WarnReason::MissingCurrencyCode => "MISSING_CURRENCY_CODE",
            WarnReason::UnitPriceWithoutQuantity => "UNIT_PRICE_WITHOUT_QUANTITY",
            WarnReason::MissingPriceFields => "MISSING_PRICE_FIELDS",
        }
    }
}

impl fmt::Display for WarnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
