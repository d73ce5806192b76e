/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 拆分逗号分隔的编码串，去掉空白与空段
///
/// `"bean_1, milk_1,,cup_12oz"` → `["bean_1", "milk_1", "cup_12oz"]`
pub fn split_codes(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_codes_trims_and_skips_empty() {
        assert_eq!(
            split_codes(" bean_1, milk_1,,cup_12oz "),
            vec!["bean_1", "milk_1", "cup_12oz"]
        );
        assert!(split_codes("").is_empty());
        assert!(split_codes(" , ").is_empty());
    }
}
