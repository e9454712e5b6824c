//! 识别结果载荷解析
//!
//! 载荷由识别服务写入，形如
//! `{"currencyCode": "AUD", "lineItems": [{"description": "...", "quantity": "2", ...}]}`。
//! 数值字段可以是数字或字符串；字符串无法解析时该字段视为缺失并记录告警，
//! 由质量门转成 `FAILED_NUMERIC_PARSE`，不会中断处理。

use bigdecimal::BigDecimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::normalize::NumericParse;

/// 载荷不是可识别的文档结构
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("extracted document must be a JSON object")]
    NotAnObject,
    #[error("extracted document field '{0}' must be an array")]
    ItemsNotArray(&'static str),
    #[error("extracted line item {0} must be a JSON object")]
    ItemNotAnObject(usize),
}

const ITEM_KEYS: &[&str] = &["lineItems", "line_items", "items"];

/// 解析出的文档
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub currency_code: Option<String>,
    pub line_items: Vec<ExtractedLineItem>,
}

/// 解析出的单行，保留原文以便追溯
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLineItem {
    pub description: String,
    pub unit: Option<String>,
    pub product_code: Option<String>,
    pub currency_code: Option<String>,
    pub raw_quantity: Option<String>,
    pub raw_unit_price: Option<String>,
    pub raw_line_total: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub line_total: Option<BigDecimal>,
    pub confidence: Option<f64>,
    pub numeric_parse: NumericParse,
}

pub fn parse_extracted_document(raw: &Value) -> Result<ExtractedDocument, DocumentError> {
    let object = raw.as_object().ok_or(DocumentError::NotAnObject)?;

    let mut line_items = Vec::new();
    if let Some((key, items)) = ITEM_KEYS
        .iter()
        .find_map(|key| object.get(*key).map(|v| (*key, v)))
    {
        let items: &[Value] = match items {
            Value::Array(items) => items.as_slice(),
            Value::Null => &[],
            _ => return Err(DocumentError::ItemsNotArray(key)),
        };
        for (idx, item) in items.iter().enumerate() {
            let item = item.as_object().ok_or(DocumentError::ItemNotAnObject(idx))?;
            line_items.push(parse_line_item(item));
        }
    }

    Ok(ExtractedDocument {
        currency_code: text_field(object, &["currencyCode", "currency_code", "currency"]),
        line_items,
    })
}

fn parse_line_item(item: &Map<String, Value>) -> ExtractedLineItem {
    let mut numeric_parse = NumericParse::clean();

    let (raw_quantity, quantity) = numeric_field(item, &["quantity", "qty"], "quantity", &mut numeric_parse);
    let (raw_unit_price, unit_price) =
        numeric_field(item, &["unitPrice", "unit_price"], "unitPrice", &mut numeric_parse);
    let (raw_line_total, line_total) = numeric_field(
        item,
        &["amount", "lineTotal", "line_total", "total"],
        "lineTotal",
        &mut numeric_parse,
    );

    ExtractedLineItem {
        description: text_field(item, &["description", "desc"]).unwrap_or_default(),
        unit: text_field(item, &["unit", "uom"]),
        product_code: text_field(item, &["productCode", "product_code", "code"]),
        currency_code: text_field(item, &["currencyCode", "currency_code", "currency"]),
        raw_quantity,
        raw_unit_price,
        raw_line_total,
        quantity,
        unit_price,
        line_total,
        confidence: item.get("confidence").and_then(Value::as_f64),
        numeric_parse,
    }
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// 返回 (原文, 解析值)；解析失败时记录告警
fn numeric_field(
    object: &Map<String, Value>,
    keys: &[&str],
    label: &str,
    parse: &mut NumericParse,
) -> (Option<String>, Option<BigDecimal>) {
    let Some(value) = keys.iter().find_map(|key| object.get(*key)) else {
        return (None, None);
    };
    let raw = match value {
        Value::Null => return (None, None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    match parse_decimal(&raw) {
        Some(parsed) => (Some(raw), Some(parsed)),
        None => {
            parse.failed = true;
            parse.warnings.push(format!("{label}: unparseable '{raw}'"));
            (Some(raw), None)
        }
    }
}

/// 宽松的金额/数量解析：去币种符号、千分位、空白；`(5.00)` 表示负数
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '_') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value = BigDecimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}
