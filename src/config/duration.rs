//! 时长字符串解析
//!
//! 支持 "300ms"、"10s"、"1m30s"、"1.5h" 这类带单位的组合写法

use std::time::Duration;

/// 单位及其对应的纳秒数，按匹配优先级排列（"ms" 必须先于 "m" 与 "s"）
const UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

/// 解析时长字符串
///
/// # 参数
/// * `input` - 形如 "10s" 或 "1h15m" 的字符串，"0" 单独出现时不需要单位
///
/// # 返回
/// * `Result<Duration, String>` - 解析结果或错误描述
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("时长字符串为空".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(format!("不支持负数时长: {input}"));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos: u64 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("无效的时长: {input}"));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("时长中的数字无效: {number}"))?;

        let (unit, nanos_per_unit) = UNITS
            .iter()
            .find(|(unit, _)| tail.starts_with(unit))
            .ok_or_else(|| format!("时长缺少或包含未知单位: {input}"))?;

        let term = (value * *nanos_per_unit as f64).round();
        if !term.is_finite() || term >= u64::MAX as f64 {
            return Err(format!("时长过大: {input}"));
        }
        total_nanos = total_nanos
            .checked_add(term as u64)
            .ok_or_else(|| format!("时长过大: {input}"))?;
        rest = &tail[unit.len()..];
    }

    Ok(Duration::from_nanos(total_nanos))
}
