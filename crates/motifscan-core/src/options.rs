//! 分析选项与分析报告（模块）
use serde::Deserialize;
use std::time::Duration;

use crate::types::{ChunkFailure, ResultSet};

/// 默认重叠窗口（字节，按字符边界取整）
pub const DEFAULT_OVERLAP: usize = 100;
/// 默认单任务截止时间
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// 任务失败时的处理策略
/// - Abort：任一任务失败/超时即整体失败（默认）
/// - Partial：跳过失败块，返回其余块的合并结果，并在报告中列出失败块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Partial,
}

/// 分析选项
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// 工作线程数（同时也是分块数）：None 表示自动（等于 CPU 核数）
    pub workers: Option<usize>,
    /// 每块右侧追加的重叠长度
    pub overlap: usize,
    /// 单任务截止时间（所有任务同时派发，自派发起计时）
    pub task_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            workers: None,
            overlap: DEFAULT_OVERLAP,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl AnalyzerOptions {
    /// 实际使用的工作线程数（至少为 1）
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// 分析报告（便于 CLI 打印）
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub results: ResultSet,
    pub elapsed: Duration,
    pub total_matches: usize,
    pub pattern_types_found: usize,
    /// 文本长度（字符数）
    pub text_len: usize,
    pub workers: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl AnalysisReport {
    pub(crate) fn new(results: ResultSet, elapsed: Duration, text_len: usize, workers: usize, failed_chunks: Vec<ChunkFailure>) -> Self {
        let total_matches = results.values().map(Vec::len).sum();
        let pattern_types_found = results.values().filter(|m| !m.is_empty()).count();
        Self { results, elapsed, total_matches, pattern_types_found, text_len, workers, failed_chunks }
    }

    /// 吞吐量（字符/秒）
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 { return 0.0; }
        self.text_len as f64 / secs
    }

    /// 转为 JSON（结果按规则名有序）
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "results": self.results,
            "stats": {
                "text_length": self.text_len,
                "elapsed_ms": self.elapsed.as_secs_f64() * 1000.0,
                "workers": self.workers,
                "pattern_types_found": self.pattern_types_found,
                "total_matches": self.total_matches,
            },
            "failed_chunks": self.failed_chunks,
        })
    }
}
