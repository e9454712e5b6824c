use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::UnitCategory;

/// 单位同义词 -> 规范标签
const UNIT_SYNONYMS: &[(&str, &str)] = &[
    ("KG", "KG"),
    ("KGS", "KG"),
    ("KILO", "KG"),
    ("KILOS", "KG"),
    ("KILOGRAM", "KG"),
    ("KILOGRAMS", "KG"),
    ("G", "G"),
    ("GR", "G"),
    ("GM", "G"),
    ("GRAM", "G"),
    ("GRAMS", "G"),
    ("L", "L"),
    ("LT", "L"),
    ("LTR", "L"),
    ("LITRE", "L"),
    ("LITRES", "L"),
    ("LITER", "L"),
    ("LITERS", "L"),
    ("ML", "ML"),
    ("MILLILITRE", "ML"),
    ("MILLILITRES", "ML"),
    ("MILLILITER", "ML"),
    ("MILLILITERS", "ML"),
    ("EACH", "EACH"),
    ("EA", "EACH"),
    ("UNIT", "UNIT"),
    ("UNITS", "UNIT"),
    ("PC", "PC"),
    ("PCS", "PC"),
    ("PIECE", "PC"),
    ("PIECES", "PC"),
    ("DOZEN", "DOZEN"),
    ("DZ", "DOZEN"),
    ("PACK", "PACK"),
    ("PK", "PACK"),
    ("BOX", "BOX"),
    ("CASE", "CASE"),
    ("CTN", "CARTON"),
    ("CARTON", "CARTON"),
    ("BOTTLE", "BOTTLE"),
    ("BTL", "BOTTLE"),
    ("BUNCH", "BUNCH"),
    ("TRAY", "TRAY"),
];

const WEIGHT_LABELS: &[&str] = &["KG", "G"];
const VOLUME_LABELS: &[&str] = &["L", "ML"];

/// 描述中可提取的单位写法 (长的在前，交替按最左优先匹配)
const DESCRIPTION_UNIT_TOKENS: &str = r"kilograms?|kilos?|kgs?|grams?|gm|gr|g|millilit(?:re|er)s?|ml|lit(?:re|er)s?|ltr|lt|l|each|ea|units?";

static SYNONYMS: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
static MEASURE_PATTERN: OnceLock<Regex> = OnceLock::new();
static PACK_PATTERN: OnceLock<Regex> = OnceLock::new();

fn synonyms() -> &'static HashMap<&'static str, &'static str> {
    SYNONYMS.get_or_init(|| UNIT_SYNONYMS.iter().copied().collect())
}

/// 数字紧跟单位，如 `2kg`、`12KILO`、`500 ml`；数字前可以直接连着单词 (`Mince500g`)
fn measure_pattern() -> &'static Regex {
    MEASURE_PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)(?:^|[^\d.,])\d+(?:[.,]\d+)?\s*({DESCRIPTION_UNIT_TOKENS})\b"))
            .expect("valid regex")
    })
}

/// 装箱写法 `<整数> x <数字><单位>`，如 `2 x 2.5kg`
fn pack_pattern() -> &'static Regex {
    PACK_PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)(?:^|[^\d.,])\d+\s*[x×*]\s*\d+(?:[.,]\d+)?\s*(?:{DESCRIPTION_UNIT_TOKENS})\b"
        ))
        .expect("valid regex")
    })
}

/// 单位规范化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    pub label: Option<String>,
    pub category: UnitCategory,
}

impl ResolvedUnit {
    fn unknown() -> Self {
        Self {
            label: None,
            category: UnitCategory::Unknown,
        }
    }
}

/// 规范标签对应的类别；未收录的标签为 UNKNOWN
pub fn category_for_label(label: &str) -> UnitCategory {
    if WEIGHT_LABELS.contains(&label) {
        UnitCategory::Weight
    } else if VOLUME_LABELS.contains(&label) {
        UnitCategory::Volume
    } else if synonyms().values().any(|canonical| *canonical == label) {
        UnitCategory::Unit
    } else {
        UnitCategory::Unknown
    }
}

/// 标签大写、压空白后查同义词表；未收录时保留规范化后的原标签
pub fn canonical_unit_label(raw: &str) -> Option<String> {
    let cleaned = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_ascii_uppercase();
    if cleaned.is_empty() {
        return None;
    }
    Some(
        synonyms()
            .get(cleaned.as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or(cleaned),
    )
}

/// 从原始描述中提取单位；装箱写法整体不提取
pub fn extract_unit_from_description(description: &str) -> Option<String> {
    if pack_pattern().is_match(description) {
        return None;
    }
    let captures = measure_pattern().captures(description)?;
    let token = captures.get(1)?.as_str().to_ascii_uppercase();
    synonyms().get(token.as_str()).map(|canonical| canonical.to_string())
}

/// 单位规范化：优先显式标签，否则从描述中提取
pub fn canonicalize_unit(explicit_label: Option<&str>, raw_description: &str) -> ResolvedUnit {
    let label = match explicit_label.and_then(canonical_unit_label) {
        Some(label) => Some(label),
        None => extract_unit_from_description(raw_description),
    };
    match label {
        Some(label) => ResolvedUnit {
            category: category_for_label(&label),
            label: Some(label),
        },
        None => ResolvedUnit::unknown(),
    }
}
