//! 单块检测器：目录规则匹配 + 三个结构检测器
use tracing::trace;

use crate::catalog::{CompiledPattern, PatternCatalog, RawHit};
use crate::chunk::Chunk;
use crate::dispatch::CancelToken;
use crate::error::DetectError;
use crate::structural::{find_entropy_anomalies, find_palindromes, find_repeating};
use crate::types::{Match, ResultSet, ENTROPY_ANOMALIES, PALINDROMES, REPEATING_SUBSEQUENCES};

/// 对单块运行全部检测，命中位置换算为绝对偏移
/// - 目录规则名总会出现在结果中（可能为空列表）
/// - 结构检测器仅在有命中时出现
/// - 任一规则失败则整块失败，不返回部分结果
pub fn detect_chunk(chunk: &Chunk, catalog: &PatternCatalog, cancel: &CancelToken) -> Result<ResultSet, DetectError> {
    let mut results = ResultSet::new();

    for pattern in catalog.patterns() {
        cancel.check()?;
        let matches = find_pattern(pattern, chunk, cancel)?;
        trace!(chunk = chunk.id, pattern = pattern.spec.name, hits = matches.len(), "pattern scanned");
        results.insert(pattern.spec.name.to_string(), matches);
    }

    let text = chunk.text();
    let custom = [
        (REPEATING_SUBSEQUENCES, find_repeating(text, chunk.offset, cancel)?),
        (PALINDROMES, find_palindromes(text, chunk.offset, cancel)?),
        (ENTROPY_ANOMALIES, find_entropy_anomalies(text, chunk.offset, cancel)?),
    ];
    for (name, matches) in custom {
        if !matches.is_empty() {
            results.insert(name.to_string(), matches);
        }
    }

    Ok(results)
}

/// 显式“查找全部”循环：每次从上一命中结尾继续搜索，一直扫到正文（含重叠区）末尾
/// - 零宽命中向前推进一个字符，防止死循环
/// - 非全局规则只记录首个命中
/// - 重叠区内与右邻块重复或错位的命中由合并阶段按单次扫描的顺序裁决
fn find_pattern(pattern: &CompiledPattern, chunk: &Chunk, cancel: &CancelToken) -> Result<Vec<Match>, DetectError> {
    let window = chunk.window();
    let body = chunk.body();
    // window[0] 在原文中的绝对偏移
    let origin = chunk.offset - body.start;
    let mut out = Vec::new();
    let mut at = body.start;

    while at <= body.end {
        let hit = match pattern.find_at(window, at, body.end)? {
            Some(h) => h,
            None => break,
        };
        let (start, end) = (hit.start, hit.end);
        out.push(to_match(window, hit, origin));
        if !pattern.spec.flags.global { break; }

        // 推进光标，防止零宽循环
        at = if end > start { end } else { next_char(window, end) };
        cancel.check()?;
    }

    Ok(out)
}

/// 在原文 `[at, end)` 内查找下一个命中（合并阶段顺序重扫用）
pub(crate) fn find_next(pattern: &CompiledPattern, text: &str, at: usize, end: usize) -> Result<Option<Match>, DetectError> {
    Ok(pattern.find_at(text, at, end)?.map(|hit| to_match(text, hit, 0)))
}

fn to_match(haystack: &str, hit: RawHit, origin: usize) -> Match {
    Match {
        groups: hit.groups,
        ..Match::new(&haystack[hit.start..hit.end], hit.start + origin)
    }
}

pub(crate) fn next_char(text: &str, i: usize) -> usize {
    text[i..].chars().next().map_or(i + 1, |c| i + c.len_utf8())
}
