//! 内置规则目录（固定常量集合）与编译后的匹配器
//!
//! - 普通规则使用 `regex-automata` 的 meta 引擎（线性时间，支持按 span 续搜）
//! - `\d`、`\w`、`\s`、`\b` 按 ASCII 解释：非 ASCII 数字不算数字，重音字母不算单词字符
//! - 需要反向引用的规则（如 `(.{2,})\1{2,}`）使用 `fancy-regex` 回溯引擎
//! - 目录在 `Analyzer` 创建时编译一次，之后以只读方式被所有任务共享
use regex_automata::meta;
use regex_automata::util::syntax;
use regex_automata::Input;

use crate::error::{AnalysisError, DetectError};

/// 匹配引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// 自动机正则（不支持反向引用）
    Regex,
    /// 回溯正则（支持反向引用，有回溯上限）
    Backtracking,
}

/// 规则标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternFlags {
    /// 全局匹配：找出全部不重叠命中；否则只记录块内首个命中
    pub global: bool,
    pub case_insensitive: bool,
}

impl PatternFlags {
    pub const GLOBAL: PatternFlags = PatternFlags { global: true, case_insensitive: false };
    pub const GLOBAL_CASELESS: PatternFlags = PatternFlags { global: true, case_insensitive: true };
}

/// 规则规格（名称唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternSpec {
    pub name: &'static str,
    pub source: &'static str,
    pub flags: PatternFlags,
    pub kind: PatternKind,
}

const fn regex(name: &'static str, source: &'static str) -> PatternSpec {
    PatternSpec { name, source, flags: PatternFlags::GLOBAL, kind: PatternKind::Regex }
}

const BUILTIN_SPECS: &[PatternSpec] = &[
    regex("Email Addresses", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b"),
    regex("Phone Numbers", r"(?:\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}|\d{3}[-.\s]?\d{3}[-.\s]?\d{4})"),
    regex("URLs", r"https?://(?:[-\w.])+(?::[0-9]+)?(?:/(?:[\w/_.])*(?:\?(?:[\w&=%.])*)?(?:#(?:[\w.])*)?)?"),
    regex("Credit Card Numbers", r"\b(?:\d{4}[-\s]?){3}\d{4}\b"),
    regex("Social Security Numbers", r"\b\d{3}-\d{2}-\d{4}\b"),
    regex("IP Addresses", r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b"),
    regex("Dates", r"\b(?:\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}[/\-]\d{1,2}[/\-]\d{1,2})\b"),
    regex("Time Patterns", r"\b(?:[01]?[0-9]|2[0-3]):[0-5][0-9](?::[0-5][0-9])?\s?(?:AM|PM|am|pm)?\b"),
    regex("Hexadecimal", r"\b0x[a-fA-F0-9]+\b|\b[a-fA-F0-9]{2,}\b"),
    regex("Binary Patterns", r"\b[01]{4,}\b"),
    regex("Base64 Encoded", r"\b[A-Za-z0-9+/]{4,}={0,2}\b"),
    PatternSpec {
        name: "UUID",
        source: r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
        flags: PatternFlags::GLOBAL_CASELESS,
        kind: PatternKind::Regex,
    },
    PatternSpec {
        name: "Repeated Patterns",
        source: r"(.{2,})\1{2,}",
        flags: PatternFlags::GLOBAL,
        kind: PatternKind::Backtracking,
    },
];

/// 内置规则规格（只读）
pub fn builtin_specs() -> &'static [PatternSpec] {
    BUILTIN_SPECS
}

/// 编译后的匹配器
enum Matcher {
    Automaton(meta::Regex),
    Backtracking(fancy_regex::Regex),
}

/// 编译后的单条规则
pub(crate) struct CompiledPattern {
    pub(crate) spec: PatternSpec,
    matcher: Matcher,
}

/// 一次原始命中（块内局部坐标）
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawHit {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) groups: Vec<Option<String>>,
}

impl CompiledPattern {
    fn compile(spec: PatternSpec) -> Result<Self, AnalysisError> {
        let fail = |message: String| AnalysisError::Execution {
            chunk_id: None,
            pattern: Some(spec.name.to_string()),
            message,
        };
        let matcher = match spec.kind {
            PatternKind::Regex => {
                let re = meta::Regex::builder()
                    .syntax(
                        syntax::Config::new()
                            .unicode(false)
                            .case_insensitive(spec.flags.case_insensitive),
                    )
                    .build(spec.source)
                    .map_err(|e| fail(e.to_string()))?;
                Matcher::Automaton(re)
            }
            PatternKind::Backtracking => {
                let source = if spec.flags.case_insensitive {
                    format!("(?i){}", spec.source)
                } else {
                    spec.source.to_string()
                };
                let re = fancy_regex::Regex::new(&source).map_err(|e| fail(e.to_string()))?;
                Matcher::Backtracking(re)
            }
        };
        Ok(Self { spec, matcher })
    }

    /// 在 `haystack[span]` 内查找下一个命中
    /// - 搜索范围限定在 `at..end`，但 `\b` 等断言可以看到范围外的上下文
    /// - 返回的坐标相对于 `haystack`
    pub(crate) fn find_at(&self, haystack: &str, at: usize, end: usize) -> Result<Option<RawHit>, DetectError> {
        match &self.matcher {
            Matcher::Automaton(re) => {
                let mut caps = re.create_captures();
                let input = Input::new(haystack).span(at..end);
                re.captures(input, &mut caps);
                let m0 = match caps.get_match() { Some(m) => m, None => return Ok(None) };
                let groups = (1..caps.group_len())
                    .map(|i| caps.get_group(i).map(|sp| haystack[sp.start..sp.end].to_string()))
                    .collect();
                Ok(Some(RawHit { start: m0.start(), end: m0.end(), groups }))
            }
            Matcher::Backtracking(re) => {
                // fancy-regex 无法限定右端，这里对 [..end] 切片搜索；左侧上下文仍然可见
                let bounded = &haystack[..end];
                let caps = re.captures_from_pos(bounded, at).map_err(|e| DetectError::Pattern {
                    name: self.spec.name.to_string(),
                    message: e.to_string(),
                })?;
                let caps = match caps { Some(c) => c, None => return Ok(None) };
                let m0 = match caps.get(0) { Some(m) => m, None => return Ok(None) };
                let groups = (1..caps.len())
                    .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                    .collect();
                Ok(Some(RawHit { start: m0.start(), end: m0.end(), groups }))
            }
        }
    }
}

/// 编译后的规则目录（按内置顺序）
pub struct PatternCatalog {
    patterns: Vec<CompiledPattern>,
}

impl PatternCatalog {
    /// 编译内置目录
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::from_specs(BUILTIN_SPECS)
    }

    pub(crate) fn from_specs(specs: &[PatternSpec]) -> Result<Self, AnalysisError> {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            if patterns.iter().any(|p: &CompiledPattern| p.spec.name == spec.name) {
                return Err(AnalysisError::Execution {
                    chunk_id: None,
                    pattern: Some(spec.name.to_string()),
                    message: "duplicate pattern name".to_string(),
                });
            }
            patterns.push(CompiledPattern::compile(*spec)?);
        }
        Ok(Self { patterns })
    }

    pub(crate) fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 规则名（按目录顺序）
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.patterns.iter().map(|p| p.spec.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern<'a>(catalog: &'a PatternCatalog, name: &str) -> &'a CompiledPattern {
        catalog.patterns().iter().find(|p| p.spec.name == name).unwrap()
    }

    #[test]
    fn builtin_catalog_compiles_in_order() {
        let catalog = PatternCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 13);
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names.first(), Some(&"Email Addresses"));
        assert_eq!(names.last(), Some(&"Repeated Patterns"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let specs = [regex("Dup", "a"), regex("Dup", "b")];
        let err = PatternCatalog::from_specs(&specs).err().unwrap();
        assert!(err.to_string().contains("Dup"));
    }

    #[test]
    fn malformed_source_is_execution_error() {
        let specs = [regex("Broken", "(unclosed")];
        match PatternCatalog::from_specs(&specs) {
            Err(AnalysisError::Execution { pattern, .. }) => assert_eq!(pattern.as_deref(), Some("Broken")),
            _ => panic!("expected execution error"),
        }
    }

    #[test]
    fn word_boundary_sees_context_outside_span() {
        let catalog = PatternCatalog::builtin().unwrap();
        let hex = pattern(&catalog, "Hexadecimal");
        // 从 "beef" 开始搜索，但左侧是单词字符，\b 不成立
        let hay = "deadbeef cafe";
        let hit = hex.find_at(hay, 4, hay.len()).unwrap().unwrap();
        assert_eq!(&hay[hit.start..hit.end], "cafe");
    }

    #[test]
    fn digit_and_word_classes_are_ascii() {
        let catalog = PatternCatalog::builtin().unwrap();
        let ssn = pattern(&catalog, "Social Security Numbers");
        let hay = "id ١٢٣-٤٥-٦٧٨٩ end";
        assert!(ssn.find_at(hay, 0, hay.len()).unwrap().is_none());

        // "é" 不是单词字符，\b 在其后成立
        let hex = pattern(&catalog, "Hexadecimal");
        let hay = "x écafe y";
        let hit = hex.find_at(hay, 0, hay.len()).unwrap().unwrap();
        assert_eq!((&hay[hit.start..hit.end], hit.start), ("cafe", 4));
    }

    #[test]
    fn uuid_is_case_insensitive() {
        let catalog = PatternCatalog::builtin().unwrap();
        let uuid = pattern(&catalog, "UUID");
        let hay = "id=550E8400-E29B-41D4-A716-446655440000;";
        let hit = uuid.find_at(hay, 0, hay.len()).unwrap().unwrap();
        assert_eq!(hit.start, 3);
        assert_eq!(hit.end, hay.len() - 1);
    }

    #[test]
    fn repeated_pattern_uses_backreference() {
        let catalog = PatternCatalog::builtin().unwrap();
        let rep = pattern(&catalog, "Repeated Patterns");
        let hay = "xx abcabcabc yy";
        let hit = rep.find_at(hay, 0, hay.len()).unwrap().unwrap();
        assert_eq!(&hay[hit.start..hit.end], "abcabcabc");
        assert_eq!(hit.groups, vec![Some("abc".to_string())]);
    }

    #[test]
    fn search_is_bounded_on_the_right() {
        let catalog = PatternCatalog::builtin().unwrap();
        let ssn = pattern(&catalog, "Social Security Numbers");
        let hay = "ssn 123-45-6789";
        assert!(ssn.find_at(hay, 0, 10).unwrap().is_none());
        assert!(ssn.find_at(hay, 0, hay.len()).unwrap().is_some());
    }

    #[test]
    fn optional_groups_report_none() {
        let specs = [regex("Opt", r"(a)?(b)")];
        let catalog = PatternCatalog::from_specs(&specs).unwrap();
        let hit = catalog.patterns()[0].find_at("xb", 0, 2).unwrap().unwrap();
        assert_eq!(hit.groups, vec![None, Some("b".to_string())]);
    }
}
