use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use motifscan_core::{builtin_specs, load_options, AnalysisReport, Analyzer, AnalyzerOptions, FailurePolicy, SAMPLE_TEXT};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "motifscan", version, about = "并行文本模式识别")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 分析文本并输出命中结果
    Analyze {
        /// 输入文件；缺省或 "-" 表示从标准输入读取
        #[arg(long)]
        input: Option<PathBuf>,

        /// 输出文件；缺省写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 工作线程数（"auto"=CPU 核心数）
        #[arg(long)]
        threads: Option<String>,

        /// 配置文件路径（TOML）
        #[arg(long)]
        config: Option<PathBuf>,

        /// 输出格式
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// 任务失败时保留其余块的结果，而不是整体失败
        #[arg(long)]
        partial: bool,

        /// 不显示进度条
        #[arg(long)]
        quiet: bool,
    },
    /// 列出内置规则目录
    Catalog,
    /// 打印内置示例文本
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, output, threads, config, format, partial, quiet } => {
            // 配置文件优先加载，命令行参数再覆盖
            let mut opts = match &config {
                Some(path) => load_options(path).with_context(|| format!("load config {}", path.display()))?,
                None => AnalyzerOptions::default(),
            };
            if let Some(t) = threads.as_deref() {
                opts.workers = parse_threads(t).with_context(|| format!("invalid --threads value: {t}"))?;
            }
            if partial {
                opts.failure_policy = FailurePolicy::Partial;
            }

            let text = read_input(input.as_ref()).context("read input text")?;
            info!(input = ?input, bytes = text.len(), "starting analysis");

            let analyzer = Analyzer::new(opts).context("build analyzer")?;
            let bar = progress_bar(quiet);
            let report = analyzer
                .analyze_with_progress(&text, |p| bar.set_position(p.round() as u64))
                .context("analysis failed");
            bar.finish_and_clear();
            let report = report?;

            // 以缓冲方式打开输出
            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(File::create(path).context("create output file")?),
                None => Box::new(io::stdout().lock()),
            };
            let mut out = BufWriter::new(sink);
            match format {
                OutputFormat::Text => write_text(&mut out, &report)?,
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &report.to_json())?;
                    writeln!(out)?;
                }
            }
            out.flush().context("flush output")?;

            info!(
                total_matches = report.total_matches,
                pattern_types = report.pattern_types_found,
                failed_chunks = report.failed_chunks.len(),
                "analysis finished"
            );
        }
        Commands::Catalog => {
            let mut out = io::stdout().lock();
            for spec in builtin_specs() {
                let flags = if spec.flags.case_insensitive { "gi" } else { "g" };
                writeln!(out, "{:<24} /{}/{}", spec.name, spec.source, flags)?;
            }
        }
        Commands::Sample => {
            println!("{SAMPLE_TEXT}");
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到 stderr，避免与结果输出混在一起
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数："auto" 返回 None；其他须为正整数
fn parse_threads(s: &str) -> Result<Option<usize>> {
    if s.eq_ignore_ascii_case("auto") { return Ok(None); }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => anyhow::bail!("expected \"auto\" or a positive integer"),
    }
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}%") {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

/// 人类可读输出：每条规则一段，随后是统计信息
fn write_text(out: &mut dyn Write, report: &AnalysisReport) -> Result<()> {
    for (name, matches) in &report.results {
        if matches.is_empty() { continue; }
        writeln!(out, "{name} ({} matches)", matches.len())?;
        for (i, m) in matches.iter().enumerate() {
            match m.entropy {
                Some(e) => writeln!(out, "  {}. {:?} at position {} (entropy {e:.3})", i + 1, m.value, m.index)?,
                None => writeln!(out, "  {}. {:?} at position {}", i + 1, m.value, m.index)?,
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "Text Length: {} characters", report.text_len)?;
    writeln!(out, "Processing Time: {:.2}ms", report.elapsed.as_secs_f64() * 1000.0)?;
    writeln!(out, "Workers Used: {}", report.workers)?;
    writeln!(out, "Pattern Types Found: {}", report.pattern_types_found)?;
    writeln!(out, "Total Matches: {}", report.total_matches)?;
    writeln!(out, "Performance: {:.0} chars/second", report.throughput())?;
    for failure in &report.failed_chunks {
        writeln!(out, "Failed chunk {}: {}", failure.chunk_id, failure.reason)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_argument() {
        assert_eq!(parse_threads("auto").unwrap(), None);
        assert_eq!(parse_threads("AUTO").unwrap(), None);
        assert_eq!(parse_threads("6").unwrap(), Some(6));
        assert!(parse_threads("0").is_err());
        assert!(parse_threads("many").is_err());
    }

    #[test]
    fn text_output_lists_matches_and_stats() {
        let analyzer = Analyzer::new(AnalyzerOptions { workers: Some(2), ..Default::default() }).unwrap();
        let report = analyzer.analyze("mail bob@mail.com at 192.168.1.1").unwrap();
        let mut buf = Vec::new();
        write_text(&mut buf, &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Email Addresses (1 matches)"));
        assert!(text.contains("1. \"bob@mail.com\" at position 5"));
        assert!(text.contains("Workers Used: 2"));
    }

    #[test]
    fn text_length_counts_characters() {
        let analyzer = Analyzer::new(AnalyzerOptions { workers: Some(1), ..Default::default() }).unwrap();
        let report = analyzer.analyze("café 0xBEEF").unwrap();
        let mut buf = Vec::new();
        write_text(&mut buf, &report).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("Text Length: 11 characters"));
    }

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from(["motifscan", "analyze", "--threads", "3", "--format", "json", "--partial"]).unwrap();
        match cli.command {
            Commands::Analyze { threads, format, partial, .. } => {
                assert_eq!(threads.as_deref(), Some("3"));
                assert_eq!(format, OutputFormat::Json);
                assert!(partial);
            }
            _ => panic!("expected analyze"),
        }
    }
}
