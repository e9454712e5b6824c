/// 去除的轻量标点
const STRIPPED_PUNCTUATION: &[char] = &['.', ',', ';', ':', '(', ')', '{', '}', '[', ']', '<', '>', '|'];

/// 描述规范化：去首尾空白、小写、去标点、连续空白压成一个空格
///
/// 去标点后再压空白，保证对已规范化的文本再执行一次不变。
pub fn normalize_description(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
