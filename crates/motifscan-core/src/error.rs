//! 错误类型
//!
//! - `AnalysisError`：对外暴露的唯一失败结果（前置条件 / 执行失败 / 超时）
//! - `DetectError`：单个检测任务内部的错误，由调度器转换为 `AnalysisError`
use std::time::Duration;
use thiserror::Error;

/// 前置条件错误：在派发任何任务之前即被拒绝
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("input text is empty")]
    EmptyInput,
    #[error("another analysis is already in progress")]
    AnalysisInProgress,
}

/// 一次分析的失败结果
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// 检测逻辑内部失败（规则编译失败、匹配引擎报错、任务 panic 等）
    #[error("{}", execution_message(.chunk_id, .pattern, .message))]
    Execution {
        chunk_id: Option<usize>,
        pattern: Option<String>,
        message: String,
    },

    /// 任务超过截止时间
    #[error("detector tasks timed out after {after:?} (pending chunks: {pending:?})")]
    Timeout { after: Duration, pending: Vec<usize> },
}

impl AnalysisError {
    pub(crate) fn execution(message: impl Into<String>) -> Self {
        AnalysisError::Execution { chunk_id: None, pattern: None, message: message.into() }
    }
}

fn execution_message(chunk_id: &Option<usize>, pattern: &Option<String>, message: &str) -> String {
    match (chunk_id, pattern) {
        (Some(id), Some(p)) => format!("chunk {id}: pattern '{p}' failed: {message}"),
        (Some(id), None) => format!("chunk {id} failed: {message}"),
        (None, Some(p)) => format!("pattern '{p}' failed: {message}"),
        (None, None) => format!("execution failed: {message}"),
    }
}

/// 单块检测的内部错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    #[error("pattern '{name}' failed: {message}")]
    Pattern { name: String, message: String },
    /// 取消信号已触发（超时或其他任务失败），结果将被丢弃
    #[error("detector run cancelled")]
    Cancelled,
}

impl DetectError {
    /// 带上块编号（合并阶段的顺序重扫没有块编号），转换为对外错误
    pub(crate) fn into_analysis(self, chunk_id: Option<usize>) -> AnalysisError {
        match self {
            DetectError::Pattern { name, message } => AnalysisError::Execution {
                chunk_id,
                pattern: Some(name),
                message,
            },
            DetectError::Cancelled => AnalysisError::Execution {
                chunk_id,
                pattern: None,
                message: "cancelled".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_message_names_chunk_and_pattern() {
        let err = DetectError::Pattern { name: "URLs".into(), message: "boom".into() }.into_analysis(Some(3));
        assert_eq!(err.to_string(), "chunk 3: pattern 'URLs' failed: boom");
        let err = DetectError::Pattern { name: "URLs".into(), message: "boom".into() }.into_analysis(None);
        assert_eq!(err.to_string(), "pattern 'URLs' failed: boom");
    }

    #[test]
    fn precondition_is_transparent() {
        let err: AnalysisError = PreconditionError::EmptyInput.into();
        assert_eq!(err.to_string(), "input text is empty");
    }
}
