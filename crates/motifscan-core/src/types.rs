//! 公共类型（对外暴露）
use serde::Serialize;
use std::collections::BTreeMap;

/// 结构检测器的合成规则名
pub const REPEATING_SUBSEQUENCES: &str = "Repeating Subsequences";
pub const PALINDROMES: &str = "Palindromes";
pub const ENTROPY_ANOMALIES: &str = "Entropy Anomalies";

/// 单次命中
/// - `index` 为原文中的绝对字节偏移
/// - `groups` 仅对带捕获组的目录规则有值
/// - `occurrences`/`positions` 仅用于重复子串；`entropy` 仅用于熵异常
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub value: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

impl Match {
    /// 仅含值与位置的命中（回文等）
    pub fn new(value: impl Into<String>, index: usize) -> Self {
        Self {
            value: value.into(),
            index,
            groups: Vec::new(),
            occurrences: None,
            positions: None,
            entropy: None,
        }
    }
}

/// 规则名 → 命中列表（按 index 升序，(value, index) 不重复）
pub type ResultSet = BTreeMap<String, Vec<Match>>;

/// 单块检测结果（交给合并器）
#[derive(Debug, Clone)]
pub struct ChunkResults {
    pub chunk_id: usize,
    pub matches: ResultSet,
}

/// 失败块记录（仅在 `FailurePolicy::Partial` 下出现）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk_id: usize,
    pub reason: String,
}
