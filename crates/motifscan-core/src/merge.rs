//! 结果合并
//!
//! - 目录规则：把各块的顺序扫描结果拼接成一次从左到右的单次扫描（与块数无关）
//! - 结构检测器：按规则名拼接、按 (value, index) 去重、按 index 排序
use std::collections::HashSet;
use std::ops::Range;
use tracing::trace;

use crate::detectors::next_char;
use crate::error::DetectError;
use crate::types::{ChunkResults, Match, ResultSet};

/// 对单条规则的命中进行稳定排序：起始偏移升序 → 长度降序 → 值字典序升序
pub(crate) fn sort_matches_stable(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        use std::cmp::Ordering;
        match a.index.cmp(&b.index) {
            Ordering::Equal => match b.value.len().cmp(&a.value.len()) {
                Ordering::Equal => a.value.cmp(&b.value),
                o => o,
            },
            o => o,
        }
    });
}

/// 合并各块结果（目录规则需先经 `stitch_scans` 取出）
/// - 先按块编号排序，使相同 (value, index) 时保留的条目与完成顺序无关
/// - 去重只在同一规则名内进行，不做跨规则去重
/// - 不重新施加单块上限
pub fn merge_results(mut chunks: Vec<ChunkResults>) -> ResultSet {
    chunks.sort_by_key(|c| c.chunk_id);

    let mut merged = ResultSet::new();
    for chunk in chunks {
        for (name, matches) in chunk.matches {
            merged.entry(name).or_insert_with(Vec::new).extend(matches);
        }
    }

    for matches in merged.values_mut() {
        sort_matches_stable(matches);
        let mut seen: HashSet<(String, usize)> = HashSet::with_capacity(matches.len());
        matches.retain(|m| seen.insert((m.value.clone(), m.index)));
    }

    merged
}

/// 某条目录规则在单个块上的顺序扫描结果
#[derive(Debug, Clone)]
pub(crate) struct ScanSegment {
    /// 块正文（含右侧重叠）在原文中的范围
    pub(crate) span: Range<usize>,
    /// 按扫描顺序（即 index 升序）排列的命中
    pub(crate) matches: Vec<Match>,
}

enum Lookup {
    /// 从该位置继续单次扫描时的下一个命中
    Found(Match),
    /// 本块内从该位置起再无命中
    Exhausted,
    /// 本块的扫描在该位置处与单次扫描错位，或命中可能被块末截断
    Unknown,
}

impl ScanSegment {
    fn lookup(&self, pos: usize, text_len: usize) -> Lookup {
        let k = self.matches.partition_point(|m| m.index < pos);
        // 本块在 pos 之前的最后一个命中越过了 pos：块内扫描状态与单次扫描不同
        if k > 0 && match_end(&self.matches[k - 1]) > pos {
            return Lookup::Unknown;
        }
        match self.matches.get(k) {
            Some(m) if match_end(m) < self.span.end || self.span.end == text_len => Lookup::Found(m.clone()),
            Some(_) => Lookup::Unknown,
            None => Lookup::Exhausted,
        }
    }
}

fn match_end(m: &Match) -> usize {
    m.index + m.value.len()
}

/// 把各块的扫描结果拼接为单次扫描的结果
/// - `segments` 按块起点升序；缺失的块（部分结果策略）直接跳过
/// - 每一步选用起点不晚于当前位置的最后一个块：它在当前位置右侧看得最远；
///   因此只有长于重叠区的命中可能因块末截断而与单次扫描不同
/// - 该块在当前位置与单次扫描错位时，调用 `rescan(pos, end)` 在原文 `[pos, end)` 上顺序查找一步，直到重新对齐
/// - `first_only` 对应非全局规则：只取第一个命中
pub(crate) fn stitch_scans<F>(
    text: &str,
    segments: &[ScanSegment],
    first_only: bool,
    mut rescan: F,
) -> Result<Vec<Match>, DetectError>
where
    F: FnMut(usize, usize) -> Result<Option<Match>, DetectError>,
{
    let mut out = Vec::new();
    let mut pos = 0;

    while pos <= text.len() {
        let k = segments.partition_point(|s| s.span.start <= pos);
        let next_start = segments.get(k).map(|s| s.span.start);
        if k == 0 {
            match next_start {
                Some(start) => { pos = start; continue; }
                None => break,
            }
        }
        let seg = &segments[k - 1];
        if pos > seg.span.end || (pos == seg.span.end && pos < text.len()) {
            // 当前位置落在缺失块内
            match next_start {
                Some(start) => { pos = start; continue; }
                None => break,
            }
        }

        let hit = match seg.lookup(pos, text.len()) {
            Lookup::Found(m) => Some(m),
            Lookup::Exhausted => None,
            Lookup::Unknown => {
                // 搜索范围延伸到下一块末尾，给跨块边界的命中留出余量
                let end = segments.get(k).map_or(seg.span.end, |s| s.span.end).max(seg.span.end);
                trace!(pos, end, "chunk scan out of step, searching sequentially");
                rescan(pos, end)?
            }
        };
        // 本块内从 pos 起再无命中，或命中已落在下一块里：[pos, 下一块起点) 内没有命中，
        // 改由下一块接手，它在命中右侧看得更远
        let m = match (hit, next_start) {
            (Some(m), Some(start)) if m.index >= start => { pos = start; continue; }
            (Some(m), _) => m,
            (None, Some(start)) => { pos = start; continue; }
            (None, None) => break,
        };

        pos = if m.value.is_empty() { next_char(text, m.index) } else { match_end(&m) };
        out.push(m);
        if first_only { break; }
    }

    Ok(out)
}
