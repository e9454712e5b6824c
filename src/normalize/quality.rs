use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexSet;

use crate::models::{AdjustmentStatus, QualityStatus, UnitCategory, WarnReason};
use crate::normalize::currency::is_valid_currency_code;

/// 上游数值解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumericParse {
    pub failed: bool,
    pub warnings: Vec<String>,
}

impl NumericParse {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn has_problems(&self) -> bool {
        self.failed || !self.warnings.is_empty()
    }
}

/// 质量门输入 (币种均为已规范化的值)
#[derive(Debug, Clone, Copy)]
pub struct QualityInput<'a> {
    pub quantity: Option<&'a BigDecimal>,
    pub unit_category: UnitCategory,
    pub unit_price: Option<&'a BigDecimal>,
    pub line_total: Option<&'a BigDecimal>,
    pub adjustment_status: AdjustmentStatus,
    pub line_currency_code: Option<&'a str>,
    pub header_currency_code: Option<&'a str>,
    pub numeric_parse: &'a NumericParse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityVerdict {
    pub status: QualityStatus,
    pub reasons: Vec<String>,
}

/// 质量门：每条规则独立判断，无规则命中为 OK
pub fn assess_quality(input: &QualityInput<'_>) -> QualityVerdict {
    let zero = BigDecimal::zero();
    let mut reasons: IndexSet<String> = IndexSet::new();
    let mut flag = |reason: WarnReason| {
        reasons.insert(reason.code().to_string());
    };

    let positive_quantity = input.quantity.is_some_and(|q| *q > zero);
    let credited = input.adjustment_status == AdjustmentStatus::Credited;

    if input.numeric_parse.has_problems() {
        flag(WarnReason::FailedNumericParse);
    }
    if input.quantity.is_none() && !credited {
        flag(WarnReason::MissingQuantity);
    }
    if input.quantity.is_some_and(|q| *q <= zero) {
        flag(WarnReason::NonPositiveQuantity);
    }
    if input.line_total.is_some_and(|t| *t < zero) && !credited {
        flag(WarnReason::NegativeLineTotalNotCredited);
    }
    if positive_quantity && input.unit_category == UnitCategory::Unknown {
        flag(WarnReason::UnknownUnitCategory);
    }
    if input.line_currency_code.is_some_and(|c| !is_valid_currency_code(c)) {
        flag(WarnReason::InvalidCurrencyCode);
    }
    if input.line_currency_code.is_none() && input.header_currency_code.is_none() {
        flag(WarnReason::MissingCurrencyCode);
    }
    if input.unit_price.is_some() && !positive_quantity {
        flag(WarnReason::UnitPriceWithoutQuantity);
    }
    if positive_quantity && input.unit_price.is_none() && input.line_total.is_none() {
        flag(WarnReason::MissingPriceFields);
    }

    for warning in &input.numeric_parse.warnings {
        reasons.insert(warning.clone());
    }

    let status = if reasons.is_empty() {
        QualityStatus::Ok
    } else {
        QualityStatus::Warn
    };
    QualityVerdict {
        status,
        reasons: reasons.into_iter().collect(),
    }
}
