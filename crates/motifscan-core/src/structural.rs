//! 结构检测器：重复子串 / 回文 / 熵异常
//!
//! 三者都按“字符”而非字节计长度与窗口，命中位置换算为原文绝对字节偏移。
//! 每个检测器在单块内设有上限，上限在合并前生效（按块而非全局）。
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::dispatch::CancelToken;
use crate::error::DetectError;
use crate::types::Match;

pub const REPEAT_MIN_LEN: usize = 3;
pub const REPEAT_MAX_LEN: usize = 20;
pub const REPEAT_CAP: usize = 50;

pub const PALINDROME_MIN_LEN: usize = 3;
pub const PALINDROME_CAP: usize = 20;

pub const ENTROPY_WINDOW: usize = 50;
pub const ENTROPY_LOW: f64 = 2.0;
pub const ENTROPY_HIGH: f64 = 4.5;
pub const ENTROPY_CAP: usize = 10;

/// 每隔多少个起点检查一次取消信号
const CANCEL_STRIDE: usize = 1024;

/// 每个字符的起始字节偏移，末尾追加文本长度作为哨兵
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

/// 重复子串：长度 3..=20，出现至少两次的子串各输出一次
/// 顺序为“长度递增 → 首次出现位置递增”，单块上限 50
pub fn find_repeating(text: &str, offset: usize, cancel: &CancelToken) -> Result<Vec<Match>, DetectError> {
    let bounds = char_bounds(text);
    let n = bounds.len() - 1;
    let mut out = Vec::new();

    for len in REPEAT_MIN_LEN..=REPEAT_MAX_LEN {
        if len > n { break; }
        cancel.check()?;

        // 保留首次出现顺序
        let mut order: Vec<&str> = Vec::new();
        let mut seen: HashMap<&str, Vec<usize>> = HashMap::new();
        for i in 0..=n - len {
            let sub = &text[bounds[i]..bounds[i + len]];
            match seen.entry(sub) {
                Entry::Occupied(mut e) => e.get_mut().push(bounds[i]),
                Entry::Vacant(e) => {
                    order.push(sub);
                    e.insert(vec![bounds[i]]);
                }
            }
        }

        for sub in order {
            let positions = &seen[sub];
            if positions.len() < 2 { continue; }
            let positions: Vec<usize> = positions.iter().map(|p| p + offset).collect();
            out.push(Match {
                index: positions[0],
                occurrences: Some(positions.len()),
                positions: Some(positions),
                ..Match::new(sub, 0)
            });
            if out.len() == REPEAT_CAP { return Ok(out); }
        }
    }
    Ok(out)
}

/// 回文：中心扩展（奇数与偶数长度），每次扩展到长度 ≥3 即输出一次；单块上限 20
pub fn find_palindromes(text: &str, offset: usize, cancel: &CancelToken) -> Result<Vec<Match>, DetectError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let end_of = |k: usize| if k + 1 < n { chars[k + 1].0 } else { text.len() };
    let mut out = Vec::new();

    for i in 0..n {
        if i % CANCEL_STRIDE == 0 { cancel.check()?; }

        // 奇数长度：单字符中心
        let mut j = 0;
        while j <= i && i + j < n {
            if chars[i - j].1 != chars[i + j].1 { break; }
            if 2 * j + 1 >= PALINDROME_MIN_LEN {
                let (s, e) = (chars[i - j].0, end_of(i + j));
                out.push(Match::new(&text[s..e], s + offset));
                if out.len() == PALINDROME_CAP { return Ok(out); }
            }
            j += 1;
        }

        // 偶数长度：中心位于 i 与 i+1 之间
        let mut j = 0;
        while j <= i && i + j + 1 < n {
            if chars[i - j].1 != chars[i + j + 1].1 { break; }
            if 2 * j + 2 >= PALINDROME_MIN_LEN {
                let (s, e) = (chars[i - j].0, end_of(i + j + 1));
                out.push(Match::new(&text[s..e], s + offset));
                if out.len() == PALINDROME_CAP { return Ok(out); }
            }
            j += 1;
        }
    }
    Ok(out)
}

/// 熵异常：50 字符滑动窗口（步长 1 字符），熵 < 2.0 或 > 4.5 比特即标记；单块上限 10
pub fn find_entropy_anomalies(text: &str, offset: usize, cancel: &CancelToken) -> Result<Vec<Match>, DetectError> {
    let bounds = char_bounds(text);
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut out = Vec::new();
    if n < ENTROPY_WINDOW { return Ok(out); }

    // 有序计数，保证求和顺序固定、阈值判断可复现
    let mut freq: BTreeMap<char, usize> = BTreeMap::new();
    for &c in &chars[..ENTROPY_WINDOW] {
        *freq.entry(c).or_insert(0) += 1;
    }

    for i in 0..=n - ENTROPY_WINDOW {
        if i > 0 {
            let gone = chars[i - 1];
            if let Some(count) = freq.get_mut(&gone) {
                *count -= 1;
                if *count == 0 { freq.remove(&gone); }
            }
            *freq.entry(chars[i + ENTROPY_WINDOW - 1]).or_insert(0) += 1;
        }
        if i % CANCEL_STRIDE == 0 { cancel.check()?; }

        let entropy = entropy_of(freq.values().copied(), ENTROPY_WINDOW);
        if entropy < ENTROPY_LOW || entropy > ENTROPY_HIGH {
            let (s, e) = (bounds[i], bounds[i + ENTROPY_WINDOW]);
            out.push(Match { entropy: Some(entropy), ..Match::new(&text[s..e], s + offset) });
            if out.len() == ENTROPY_CAP { break; }
        }
    }
    Ok(out)
}

/// 香农熵（以 2 为底），按字符频率计算
pub fn shannon_entropy(text: &str) -> f64 {
    let mut freq: BTreeMap<char, usize> = BTreeMap::new();
    let mut total = 0;
    for c in text.chars() {
        *freq.entry(c).or_insert(0) += 1;
        total += 1;
    }
    entropy_of(freq.values().copied(), total)
}

fn entropy_of(counts: impl Iterator<Item = usize>, total: usize) -> f64 {
    if total == 0 { return 0.0; }
    let total = total as f64;
    counts
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn repeating_reports_positions_and_occurrences() {
        let found = find_repeating("abcabcabc", 0, &token()).unwrap();
        let abc = found.iter().find(|m| m.value == "abc").unwrap();
        assert_eq!(abc.index, 0);
        assert_eq!(abc.occurrences, Some(3));
        assert_eq!(abc.positions.as_deref(), Some(&[0, 3, 6][..]));
        // 顺序：长度递增 → 首次出现递增
        let firsts: Vec<_> = found.iter().take(3).map(|m| m.value.as_str()).collect();
        assert_eq!(firsts, vec!["abc", "bca", "cab"]);
    }

    #[test]
    fn repeating_ignores_length_two() {
        let found = find_repeating("ababab", 0, &token()).unwrap();
        assert!(found.iter().all(|m| m.value.chars().count() >= 3));
        assert!(found.iter().any(|m| m.value == "aba"));
        assert!(find_repeating("abab", 0, &token()).unwrap().is_empty());
    }

    #[test]
    fn repeating_applies_offset_and_cap() {
        let found = find_repeating("xyzxyz", 100, &token()).unwrap();
        assert_eq!(found[0].positions.as_deref(), Some(&[100, 103][..]));

        let text = "a".repeat(200);
        assert_eq!(find_repeating(&text, 0, &token()).unwrap().len(), REPEAT_MAX_LEN - REPEAT_MIN_LEN + 1);
        let text: String = (0..400).map(|i| char::from(b'a' + (i % 7) as u8)).collect();
        assert_eq!(find_repeating(&text, 0, &token()).unwrap().len(), REPEAT_CAP);
    }

    #[test]
    fn palindromes_odd_even_and_none() {
        let found = find_palindromes("racecar", 10, &token()).unwrap();
        assert!(found.iter().any(|m| m.value == "racecar" && m.index == 10));
        assert!(found.iter().any(|m| m.value == "cec" && m.index == 12));

        let found = find_palindromes("abba", 0, &token()).unwrap();
        assert_eq!(found, vec![Match::new("abba", 0)]);

        assert!(find_palindromes("abc", 0, &token()).unwrap().is_empty());
    }

    #[test]
    fn palindromes_are_capped() {
        let text = "a".repeat(100);
        assert_eq!(find_palindromes(&text, 0, &token()).unwrap().len(), PALINDROME_CAP);
    }

    #[test]
    fn palindromes_handle_multibyte_text() {
        let found = find_palindromes("xéaéy", 0, &token()).unwrap();
        assert_eq!(found, vec![Match::new("éaé", 1)]);
    }

    #[test]
    fn entropy_of_uniform_and_distinct_windows() {
        assert_eq!(shannon_entropy(&"a".repeat(50)), 0.0);
        let distinct: String = (b'0'..b'0' + 50).map(char::from).collect();
        assert!((shannon_entropy(&distinct) - 50f64.log2()).abs() < 1e-9);
    }

    #[test]
    fn entropy_flags_low_and_high_windows() {
        let low = find_entropy_anomalies(&"a".repeat(50), 7, &token()).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].index, 7);
        assert_eq!(low[0].entropy, Some(0.0));

        let distinct: String = (b'0'..b'0' + 50).map(char::from).collect();
        let high = find_entropy_anomalies(&distinct, 0, &token()).unwrap();
        assert_eq!(high.len(), 1);
        assert!(high[0].entropy.unwrap() > 5.6);
    }

    #[test]
    fn entropy_ignores_short_text_and_caps() {
        assert!(find_entropy_anomalies(&"a".repeat(49), 0, &token()).unwrap().is_empty());
        let found = find_entropy_anomalies(&"a".repeat(500), 0, &token()).unwrap();
        assert_eq!(found.len(), ENTROPY_CAP);
        let idx: Vec<_> = found.iter().map(|m| m.index).collect();
        assert_eq!(idx, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_token_stops_detectors() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(find_repeating("abcabc", 0, &cancel), Err(DetectError::Cancelled));
        assert_eq!(find_palindromes("abba", 0, &cancel), Err(DetectError::Cancelled));
        assert_eq!(find_entropy_anomalies(&"a".repeat(60), 0, &cancel), Err(DetectError::Cancelled));
    }
}
