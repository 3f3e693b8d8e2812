//! 并行文本模式识别核心库
//!
//! 设计要点：
//! - 将输入切分为 W 个带右侧重叠的块，每块由一个隔离任务独立检测，结果按值回传。
//! - 每块运行固定规则目录（邮箱、电话、URL、UUID 等）与三个结构检测器（重复子串、回文、熵异常）。
//! - 合并时目录规则按单次从左到右扫描的结果拼接（与块数无关）；结构检测器按 (value, index) 去重、按绝对偏移升序排序。
//! - 任一任务失败或超时即整体失败（可配置为保留部分结果）。
//! - 所有位置均为原文中的字节偏移。

mod analyze;
mod catalog;
mod chunk;
mod config;
mod detectors;
mod dispatch;
mod error;
mod merge;
mod options;
mod structural;
mod types;

pub use analyze::Analyzer;
pub use catalog::{builtin_specs, PatternCatalog, PatternFlags, PatternKind, PatternSpec};
pub use chunk::{plan_chunks, Chunk};
pub use config::{load_options, parse_options};
pub use detectors::detect_chunk;
pub use dispatch::{dispatch, CancelToken, DispatchOptions, Dispatched};
pub use error::{AnalysisError, DetectError, PreconditionError};
pub use merge::merge_results;
pub use options::{AnalysisReport, AnalyzerOptions, FailurePolicy, DEFAULT_OVERLAP, DEFAULT_TASK_TIMEOUT};
pub use structural::{find_entropy_anomalies, find_palindromes, find_repeating, shannon_entropy};
pub use types::{ChunkFailure, ChunkResults, Match, ResultSet, ENTROPY_ANOMALIES, PALINDROMES, REPEATING_SUBSEQUENCES};

/// 内置示例文本（覆盖目录中的大部分规则）
pub const SAMPLE_TEXT: &str = "\
The quick brown fox jumps over the lazy dog. Email: john@example.com
Phone: (555) 123-4567 or 555-987-6543
URL: https://www.example.com/path?param=value
Credit Card: 4532-1234-5678-9012
Social Security: 123-45-6789
Date: 2023-12-25 or 12/25/2023
Time: 14:30:25 or 2:30 PM
IP Address: 192.168.1.1
MAC Address: 00:1B:44:11:3A:B7
DNA Sequence: ATCGATCGATCG
Binary: 1010101010101010
Hex: 0xDEADBEEF
Base64: SGVsbG8gV29ybGQ=
UUID: 550e8400-e29b-41d4-a716-446655440000
Lorem ipsum dolor sit amet, consectetur adipiscing elit.
The pattern ABC appears multiple times: ABC, abc, AbC
Numbers: 12345, 67890, 3.14159, -42, 1.5e10
Special chars: !@#$%^&*()_+-=[]{}|;':\",./<>?";
