/// 币种规范化：去空白转大写，空串视为缺失
///
/// 不做合法性判断，"有值但格式错误"与"缺失"在质量门中是两种状态。
pub fn normalize_currency_code(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// 合法币种：恰好三个大写字母
pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
