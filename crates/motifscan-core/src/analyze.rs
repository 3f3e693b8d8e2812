//! 分析入口：前置检查 → 分块 → 并行检测 → 合并 → 报告
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::catalog::PatternCatalog;
use crate::chunk::{plan_chunks, Chunk};
use crate::detectors::{detect_chunk, find_next};
use crate::dispatch::{dispatch, CancelToken, DispatchOptions};
use crate::error::{AnalysisError, PreconditionError};
use crate::merge::{merge_results, stitch_scans, ScanSegment};
use crate::options::{AnalysisReport, AnalyzerOptions};
use crate::types::{ChunkResults, ResultSet};

/// 文本分析器
/// - 规则目录在创建时编译一次
/// - 同一实例同一时刻只允许一个分析在进行
pub struct Analyzer {
    catalog: Arc<PatternCatalog>,
    options: AnalyzerOptions,
    in_flight: AtomicBool,
}

/// 分析结束（含出错、panic）时复位“进行中”标志
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Analyzer {
    pub fn new(options: AnalyzerOptions) -> Result<Self, AnalysisError> {
        let catalog = PatternCatalog::builtin()?;
        Ok(Self { catalog: Arc::new(catalog), options, in_flight: AtomicBool::new(false) })
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// 分析文本
    pub fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_progress(text, |_| {})
    }

    /// 分析文本并回报进度（0..=100，在调用线程上回调）
    pub fn analyze_with_progress(&self, text: &str, mut progress: impl FnMut(f64)) -> Result<AnalysisReport, AnalysisError> {
        // 空白文本直接拒绝，不派发任何任务；位置始终相对于原样传入的文本
        if text.trim().is_empty() {
            return Err(PreconditionError::EmptyInput.into());
        }
        if self.in_flight.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            return Err(PreconditionError::AnalysisInProgress.into());
        }
        let _guard = InFlightGuard(&self.in_flight);

        let workers = self.options.resolved_workers();
        info!(text_len = text.len(), workers, "starting analysis");
        let start = Instant::now();

        let chunks = plan_chunks(text, workers, self.options.overlap)?;
        debug!(chunks = chunks.len(), overlap = self.options.overlap, "chunks planned");
        let spans: Vec<_> = chunks.iter().map(Chunk::span).collect();

        let catalog = Arc::clone(&self.catalog);
        let scan = Arc::new(move |chunk: &Chunk, cancel: &CancelToken| {
            detect_chunk(chunk, &catalog, cancel)
        });
        let opts = DispatchOptions {
            workers,
            task_timeout: self.options.task_timeout,
            failure_policy: self.options.failure_policy,
        };
        let dispatched = dispatch(chunks, scan, &opts, &mut progress)?;

        let mut chunk_results = dispatched.results;
        chunk_results.sort_by_key(|c| c.chunk_id);
        let catalog_results = self.stitch_catalog(text, &spans, &mut chunk_results)?;
        let mut results = merge_results(chunk_results);
        results.extend(catalog_results);
        let report = AnalysisReport::new(results, start.elapsed(), text.chars().count(), workers, dispatched.failures);

        info!(
            total_matches = report.total_matches,
            pattern_types = report.pattern_types_found,
            failed_chunks = report.failed_chunks.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "analysis finished"
        );
        Ok(report)
    }

    /// 取出各块的目录规则结果，逐条规则拼接为单次扫描的结果
    fn stitch_catalog(
        &self,
        text: &str,
        spans: &[std::ops::Range<usize>],
        chunk_results: &mut [ChunkResults],
    ) -> Result<ResultSet, AnalysisError> {
        let mut out = ResultSet::new();
        for pattern in self.catalog.patterns() {
            let name = pattern.spec.name;
            let segments: Vec<ScanSegment> = chunk_results
                .iter_mut()
                .filter_map(|c| {
                    let matches = c.matches.remove(name)?;
                    Some(ScanSegment { span: spans.get(c.chunk_id)?.clone(), matches })
                })
                .collect();
            let mut rescans = 0usize;
            let stitched = stitch_scans(text, &segments, !pattern.spec.flags.global, |pos, end| {
                rescans += 1;
                find_next(pattern, text, pos, end)
            })
            .map_err(|e| e.into_analysis(None))?;
            if rescans > 0 {
                debug!(pattern = name, rescans, "resynced chunk scans sequentially");
            }
            out.insert(name.to_string(), stitched);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Match, ENTROPY_ANOMALIES, PALINDROMES, REPEATING_SUBSEQUENCES};

    fn analyzer(workers: usize) -> Analyzer {
        Analyzer::new(AnalyzerOptions { workers: Some(workers), ..Default::default() }).unwrap()
    }

    #[test]
    fn blank_input_is_rejected_without_dispatch() {
        let a = analyzer(4);
        let mut calls = 0;
        for text in ["", "   \n\t"] {
            let err = a.analyze_with_progress(text, |_| calls += 1).unwrap_err();
            assert!(matches!(err, AnalysisError::Precondition(PreconditionError::EmptyInput)));
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn concurrent_call_is_rejected() {
        let a = analyzer(2);
        let mut nested = None;
        a.analyze_with_progress("racecar and more text", |_| {
            if nested.is_none() {
                nested = Some(a.analyze("abc"));
            }
        })
        .unwrap();
        assert!(matches!(
            nested,
            Some(Err(AnalysisError::Precondition(PreconditionError::AnalysisInProgress)))
        ));
        // 结束后可再次调用
        assert!(a.analyze("abc def").is_ok());
    }

    #[test]
    fn digit_run_matches_do_not_depend_on_worker_count() {
        let text = "12345678901234567890";
        let expected = vec![Match::new("1234567890", 0), Match::new("1234567890", 10)];
        for workers in 1..=4 {
            let report = analyzer(workers).analyze(text).unwrap();
            assert_eq!(report.results["Phone Numbers"], expected, "{workers} workers");
        }
    }

    #[test]
    fn report_contains_catalog_and_structural_results() {
        let text = format!("racecar abcabcabc {} contact bob@mail.com", "z".repeat(60));
        let report = analyzer(3).analyze(&text).unwrap();
        assert_eq!(report.workers, 3);
        assert_eq!(report.text_len, text.len());

        // 多字节字符按字符计数
        let report = analyzer(2).analyze("héllo wörld").unwrap();
        assert_eq!(report.text_len, 11);
        assert_eq!(report.results["Email Addresses"][0].value, "bob@mail.com");
        assert!(report.results[PALINDROMES].iter().any(|m| m.value == "racecar" && m.index == 0));
        assert!(report.results[REPEATING_SUBSEQUENCES].iter().any(|m| m.value == "abc"));
        assert!(report.results[ENTROPY_ANOMALIES].iter().all(|m| m.entropy.is_some()));
        assert_eq!(report.total_matches, report.results.values().map(Vec::len).sum::<usize>());
    }
}
