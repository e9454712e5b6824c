use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::models::{AdjustmentStatus, QualityStatus, UnitCategory};
use crate::normalize::currency::normalize_currency_code;
use crate::normalize::description::normalize_description;
use crate::normalize::quality::{assess_quality, NumericParse, QualityInput};
use crate::normalize::unit::canonicalize_unit;

/// 规范行编译输入
#[derive(Debug, Clone, Default)]
pub struct LineInput<'a> {
    pub raw_description: &'a str,
    pub unit_label: Option<&'a str>,
    pub quantity: Option<&'a BigDecimal>,
    pub unit_price: Option<&'a BigDecimal>,
    pub line_total: Option<&'a BigDecimal>,
    pub currency_code: Option<&'a str>,
    pub header_currency_code: Option<&'a str>,
    pub adjustment_status: Option<AdjustmentStatus>,
    pub numeric_parse: NumericParse,
}

/// 规范行编译输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledLine {
    pub raw_description: String,
    pub normalized_description: String,
    pub unit_label: Option<String>,
    pub unit_category: UnitCategory,
    pub currency_code: Option<String>,
    pub adjustment_status: AdjustmentStatus,
    pub quality_status: QualityStatus,
    pub quality_warn_reasons: Vec<String>,
}

/// 规范行编译：描述、单位、币种、质量门的唯一入口
///
/// 行币种缺失时沿用发票头币种；头币种仅作为回退，本身不参与合法性判断。
pub fn canonicalize_line(input: &LineInput<'_>) -> CompiledLine {
    let normalized_description = normalize_description(input.raw_description);
    let unit = canonicalize_unit(input.unit_label, input.raw_description);
    let line_currency = normalize_currency_code(input.currency_code);
    let header_currency = normalize_currency_code(input.header_currency_code);
    let adjustment_status = input.adjustment_status.unwrap_or_default();

    let verdict = assess_quality(&QualityInput {
        quantity: input.quantity,
        unit_category: unit.category,
        unit_price: input.unit_price,
        line_total: input.line_total,
        adjustment_status,
        line_currency_code: line_currency.as_deref(),
        header_currency_code: header_currency.as_deref(),
        numeric_parse: &input.numeric_parse,
    });

    CompiledLine {
        raw_description: input.raw_description.to_string(),
        normalized_description,
        unit_label: unit.label,
        unit_category: unit.category,
        currency_code: line_currency.or(header_currency),
        adjustment_status,
        quality_status: verdict.status,
        quality_warn_reasons: verdict.reasons,
    }
}
