//! 分块规划：将输入切为 W 个带右侧重叠的块
//!
//! 块大小 = ceil(len / W)；第 i 块覆盖 `[i*size, min(i*size + size + overlap, len))`。
//! 重叠只追加在右侧，使起点落在本块、终点越过块边界的命中仍能在本块内完整可见。
//! 所有边界按 UTF-8 字符边界向后取整。
use std::ops::Range;

use crate::error::{AnalysisError, PreconditionError};

/// 块两侧的只读上下文长度（字节）；仅供 `\b` 等断言参考，不参与匹配
pub(crate) const CONTEXT_BYTES: usize = 8;

/// 单个块（各任务独占一份拷贝）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    /// 块在原文中的起始偏移（字节）
    pub offset: usize,
    /// 左上下文 + 正文 + 右上下文
    window: String,
    /// 正文（含右侧重叠）在 window 中的范围
    body: Range<usize>,
}

impl Chunk {
    /// 块正文（含右侧重叠区）
    pub fn text(&self) -> &str {
        &self.window[self.body.clone()]
    }

    /// 块正文在原文中的范围（绝对偏移）
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub(crate) fn window(&self) -> &str {
        &self.window
    }

    pub(crate) fn body(&self) -> Range<usize> {
        self.body.clone()
    }
}

/// 规划分块；空文本属于前置条件失败，而不是 0 块
pub fn plan_chunks(text: &str, workers: usize, overlap: usize) -> Result<Vec<Chunk>, AnalysisError> {
    if text.is_empty() {
        return Err(PreconditionError::EmptyInput.into());
    }
    let len = text.len();
    let workers = workers.max(1);
    let size = len.div_ceil(workers);

    let mut chunks = Vec::with_capacity(workers);
    for id in 0..workers {
        let raw_start = (id * size).min(len);
        let start = ceil_boundary(text, raw_start);
        // 末块截断到文本真实结尾，不做填充
        let end = ceil_boundary(text, (raw_start + size + overlap).min(len)).max(start);

        let ctx_start = floor_boundary(text, start.saturating_sub(CONTEXT_BYTES));
        let ctx_end = ceil_boundary(text, (end + CONTEXT_BYTES).min(len));

        chunks.push(Chunk {
            id,
            offset: start,
            window: text[ctx_start..ctx_end].to_string(),
            body: (start - ctx_start)..(end - ctx_start),
        });
    }
    Ok(chunks)
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) { i += 1; }
    i
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) { i -= 1; }
    i
}
