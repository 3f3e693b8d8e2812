//! 配置文件加载（TOML）
use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::options::{AnalyzerOptions, FailurePolicy};

/// 工作线程数：数字或 "auto"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WorkersEntry {
    Count(usize),
    Keyword(String),
}

/// 顶层配置文件结构（所有字段可选，缺省取默认值）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    workers: Option<WorkersEntry>,
    #[serde(default)]
    overlap: Option<usize>,
    #[serde(default)]
    task_timeout_secs: Option<u64>,
    #[serde(default)]
    failure_policy: Option<FailurePolicy>,
}

/// 从 TOML 文件加载分析选项
pub fn load_options(path: &Path) -> Result<AnalyzerOptions> {
    let txt = std::fs::read_to_string(path)?;
    parse_options(&txt)
}

/// 从 TOML 文本解析分析选项
pub fn parse_options(txt: &str) -> Result<AnalyzerOptions> {
    let parsed: ConfigFile = toml::from_str(txt)?;
    let mut opts = AnalyzerOptions::default();

    // 兼容两种写法：workers = 8 或 workers = "auto"
    opts.workers = match parsed.workers {
        None => None,
        Some(WorkersEntry::Count(0)) => bail!("workers must be at least 1"),
        Some(WorkersEntry::Count(n)) => Some(n),
        Some(WorkersEntry::Keyword(k)) if k.eq_ignore_ascii_case("auto") => None,
        Some(WorkersEntry::Keyword(k)) => bail!("invalid workers value: {k}"),
    };
    if let Some(overlap) = parsed.overlap { opts.overlap = overlap; }
    if let Some(secs) = parsed.task_timeout_secs {
        if secs == 0 { bail!("task_timeout_secs must be positive"); }
        opts.task_timeout = Duration::from_secs(secs);
    }
    if let Some(policy) = parsed.failure_policy { opts.failure_policy = policy; }

    Ok(opts)
}
