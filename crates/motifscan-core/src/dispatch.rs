//! 并行调度：每块一个隔离任务，带截止时间与快速失败
//!
//! - 每个任务独占自己的块拷贝，规则目录通过 `Arc` 只读共享
//! - 结果通过 crossbeam 通道按值回传，不共享可变状态（取消标志除外）
//! - 主线程在截止时间内逐个接收结果；首个失败即触发取消并返回
use crossbeam_channel as channel;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::chunk::Chunk;
use crate::error::{AnalysisError, DetectError};
use crate::options::FailurePolicy;
use crate::types::{ChunkFailure, ChunkResults, ResultSet};

/// 协作式取消标志：只会从 false 变为 true
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// 已取消则返回 `DetectError::Cancelled`
    pub fn check(&self) -> Result<(), DetectError> {
        if self.is_cancelled() { Err(DetectError::Cancelled) } else { Ok(()) }
    }
}

/// 调度参数
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub workers: usize,
    pub task_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

/// 调度结果：成功块（按完成顺序）+ 失败块（仅 Partial 策略）
#[derive(Debug, Default)]
pub struct Dispatched {
    pub results: Vec<ChunkResults>,
    pub failures: Vec<ChunkFailure>,
}

type Msg = (usize /*chunk_id*/, Result<ResultSet, AnalysisError>);

/// 为每个块派发一次检测
/// - `scan` 为单块检测函数，被所有任务只读共享
/// - `progress` 在每个任务成功后以 `(完成数 / 总数) * 100` 回调，严格递增
pub fn dispatch<F>(
    chunks: Vec<Chunk>,
    scan: Arc<F>,
    opts: &DispatchOptions,
    progress: &mut dyn FnMut(f64),
) -> Result<Dispatched, AnalysisError>
where
    F: Fn(&Chunk, &CancelToken) -> Result<ResultSet, DetectError> + Send + Sync + 'static,
{
    let total = chunks.len();
    let mut out = Dispatched::default();
    if total == 0 {
        return Ok(out);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .thread_name(|i| format!("motifscan-worker-{i}"))
        .build()
        .map_err(|e| AnalysisError::execution(format!("build worker pool: {e}")))?;

    // 通道用于 worker → 调度线程传递结果；容量足够，发送方永不阻塞
    let (tx, rx) = channel::bounded::<Msg>(total);
    let cancel = CancelToken::new();
    let mut pending: Vec<usize> = chunks.iter().map(|c| c.id).collect();

    for chunk in chunks {
        let tx = tx.clone();
        let scan = Arc::clone(&scan);
        let cancel = cancel.clone();
        pool.spawn(move || {
            let id = chunk.id;
            let res = match catch_unwind(AssertUnwindSafe(|| (*scan)(&chunk, &cancel))) {
                Ok(Ok(matches)) => Ok(matches),
                Ok(Err(e)) => Err(e.into_analysis(Some(id))),
                Err(panic) => Err(AnalysisError::Execution {
                    chunk_id: Some(id),
                    pattern: None,
                    message: panic_message(panic.as_ref()),
                }),
            };
            debug!(chunk = id, ok = res.is_ok(), "detector finished");
            // 调度方可能已因失败/超时返回，发送失败直接忽略
            let _ = tx.send((id, res));
        });
    }
    drop(tx);

    // 所有任务同时派发，截止时间自派发起计时
    let deadline = Instant::now() + opts.task_timeout;
    let mut completed = 0usize;

    while !pending.is_empty() {
        match rx.recv_deadline(deadline) {
            Ok((id, res)) => {
                pending.retain(|&p| p != id);
                match res {
                    Ok(matches) => {
                        completed += 1;
                        progress(completed as f64 / total as f64 * 100.0);
                        out.results.push(ChunkResults { chunk_id: id, matches });
                    }
                    Err(e) => match opts.failure_policy {
                        FailurePolicy::Abort => {
                            error!(chunk = id, error = %e, "detector failed, aborting analysis");
                            cancel.cancel();
                            return Err(e);
                        }
                        FailurePolicy::Partial => {
                            warn!(chunk = id, error = %e, "detector failed, continuing with partial results");
                            out.failures.push(ChunkFailure { chunk_id: id, reason: e.to_string() });
                        }
                    },
                }
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                cancel.cancel();
                pending.sort_unstable();
                match opts.failure_policy {
                    FailurePolicy::Abort => {
                        error!(pending = ?pending, "detector tasks timed out");
                        return Err(AnalysisError::Timeout { after: opts.task_timeout, pending });
                    }
                    FailurePolicy::Partial => {
                        warn!(pending = ?pending, "detector tasks timed out, continuing with partial results");
                        let reason = format!("timed out after {:?}", opts.task_timeout);
                        out.failures.extend(pending.drain(..).map(|chunk_id| ChunkFailure { chunk_id, reason: reason.clone() }));
                    }
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => {
                // 所有发送方已退出但仍有任务未回报（理论上不会发生）
                cancel.cancel();
                return Err(AnalysisError::execution(format!("workers exited without reporting chunks {pending:?}")));
            }
        }
    }

    Ok(out)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("detector panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("detector panicked: {s}")
    } else {
        "detector panicked".to_string()
    }
}
