//! Log classification for the supervised dev server.
//!
//! Scans a log tail against an ordered table of error matchers and a
//! parallel table of path extractors. The first matcher that hits wins,
//! so ordering encodes priority. Classification is a pure function of
//! the log text and is run on every validation cycle.

use std::fmt;

use regex::Regex;

/// Closed set of error kinds the classifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    SyntaxError,
    MissingImport,
    TypeError,
    ModuleNotFound,
    CompileFailure,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SyntaxError => "syntax error",
            Self::MissingImport => "missing import",
            Self::TypeError => "type error",
            Self::ModuleNotFound => "module not found",
            Self::CompileFailure => "compile failure",
            Self::Unknown => "unknown error",
        };
        write!(f, "{name}")
    }
}

/// One classified error with optional file context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub message: String,
    pub affected_file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)?;
        if let Some(file) = &self.affected_file {
            match self.line {
                Some(line) => write!(f, " ({file}:{line})")?,
                None => write!(f, " ({file})")?,
            }
        }
        Ok(())
    }
}

/// Verdict for one log tail snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAssessment {
    /// No error patterns and no build in progress
    Clean,
    /// A build is still in progress, judgement deferred
    Compiling,
    Errored(ErrorClassification),
}

/// Ordered pattern tables for log classification.
pub struct LogClassifier {
    /// Tried in order, first hit wins
    matchers: Vec<(Regex, ErrorCategory)>,
    /// Tried in order; group 1 is the path, group 2 (if present) the line
    path_patterns: Vec<Regex>,
    compiling: Regex,
}

impl LogClassifier {
    pub fn new() -> Self {
        let matchers = vec![
            (
                Regex::new(r"(?m)^\s*Error:\s*(.+)$").unwrap(),
                ErrorCategory::Unknown,
            ),
            (
                Regex::new(r"(?m)(?:SyntaxError|Syntax error):\s*(.+)$").unwrap(),
                ErrorCategory::SyntaxError,
            ),
            (
                Regex::new(r"(?m)TypeError:\s*(.+)$").unwrap(),
                ErrorCategory::TypeError,
            ),
            (
                Regex::new(r"(?m)ReferenceError:\s*(.+)$").unwrap(),
                ErrorCategory::MissingImport,
            ),
            (
                Regex::new(r"(?m)Module not found:\s*(.+)$").unwrap(),
                ErrorCategory::ModuleNotFound,
            ),
            (
                Regex::new(r"(?m)Cannot find module\s*(.+)$").unwrap(),
                ErrorCategory::ModuleNotFound,
            ),
            (
                Regex::new(r"(?m)Failed to compile").unwrap(),
                ErrorCategory::CompileFailure,
            ),
        ];

        let path_patterns = vec![
            // Stack frame: at fn (/path/file.tsx:3:7) or at /path/file.ts:1:1
            Regex::new(r"(?m)\bat\s+(?:[^()\n]*\()?([^\s():]+\.(?:tsx|ts|jsx|js|mjs|cjs)):(\d+)(?::\d+)?\)?")
                .unwrap(),
            // Build error header: ./app/page.tsx:3:7 on its own line
            Regex::new(r"(?m)^\./([^\s:]+\.(?:tsx|ts|jsx|js|mjs|cjs))(?::(\d+)(?::\d+)?)?")
                .unwrap(),
            Regex::new(r"Module not found[^'\n]*'([^']+)'").unwrap(),
            Regex::new(r"\bin\s+'([^']+)'").unwrap(),
        ];

        Self {
            matchers,
            path_patterns,
            compiling: Regex::new(r"\bCompiling\b").unwrap(),
        }
    }

    /// Classify one log tail snapshot.
    pub fn classify(&self, log_tail: &str) -> LogAssessment {
        for (pattern, category) in &self.matchers {
            if let Some(captures) = pattern.captures(log_tail) {
                let message = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                let (affected_file, line) = self.extract_path(log_tail);
                return LogAssessment::Errored(ErrorClassification {
                    category: *category,
                    message,
                    affected_file,
                    line,
                });
            }
        }

        if self.compiling.is_match(log_tail) {
            return LogAssessment::Compiling;
        }

        LogAssessment::Clean
    }

    fn extract_path(&self, log_tail: &str) -> (Option<String>, Option<u32>) {
        for pattern in &self.path_patterns {
            if let Some(captures) = pattern.captures(log_tail) {
                let path = match captures.get(1) {
                    Some(m) => m.as_str().trim_start_matches("./").to_string(),
                    None => continue,
                };
                let line = captures
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u32>().ok());
                return (Some(path), line);
            }
        }
        (None, None)
    }
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_log() {
        let classifier = LogClassifier::new();
        let log = "▲ Next.js 15.0.0\n- Local: http://localhost:3000\n✓ Ready in 2.3s\n";
        assert_eq!(classifier.classify(log), LogAssessment::Clean);
    }

    #[test]
    fn test_compiling_log() {
        let classifier = LogClassifier::new();
        let log = "✓ Ready in 2.3s\n○ Compiling / ...\n";
        assert_eq!(classifier.classify(log), LogAssessment::Compiling);
    }

    #[test]
    fn test_generic_error_takes_priority() {
        let classifier = LogClassifier::new();
        let log = "Error: something exploded\nModule not found: Can't resolve 'zustand'\n";

        // First declared matcher wins even though a more specific
        // category appears later in the same tail
        for _ in 0..3 {
            match classifier.classify(log) {
                LogAssessment::Errored(c) => {
                    assert_eq!(c.category, ErrorCategory::Unknown);
                    assert_eq!(c.message, "something exploded");
                }
                other => panic!("expected error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_module_not_found_with_specifier() {
        let classifier = LogClassifier::new();
        let log = "Module not found: Can't resolve 'left-pad'\n";

        match classifier.classify(log) {
            LogAssessment::Errored(c) => {
                assert_eq!(c.category, ErrorCategory::ModuleNotFound);
                assert_eq!(c.affected_file.as_deref(), Some("left-pad"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_with_stack_path() {
        let classifier = LogClassifier::new();
        let log = "SyntaxError: Unexpected end of input\n    at Object.compile (/home/user/app/app/page.tsx:14:2)\n";

        match classifier.classify(log) {
            LogAssessment::Errored(c) => {
                assert_eq!(c.category, ErrorCategory::SyntaxError);
                assert_eq!(c.message, "Unexpected end of input");
                assert_eq!(
                    c.affected_file.as_deref(),
                    Some("/home/user/app/app/page.tsx")
                );
                assert_eq!(c.line, Some(14));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_build_header_path_strips_dot_slash() {
        let classifier = LogClassifier::new();
        let log = "./app/page.tsx:3:7\nType error: Property 'foo' does not exist\nTypeError: boom\n";

        match classifier.classify(log) {
            LogAssessment::Errored(c) => {
                assert_eq!(c.category, ErrorCategory::TypeError);
                assert_eq!(c.affected_file.as_deref(), Some("app/page.tsx"));
                assert_eq!(c.line, Some(3));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_reference_error_is_missing_import() {
        let classifier = LogClassifier::new();
        let log = "ReferenceError: useState is not defined\n";

        match classifier.classify(log) {
            LogAssessment::Errored(c) => {
                assert_eq!(c.category, ErrorCategory::MissingImport);
                assert_eq!(c.message, "useState is not defined");
                assert!(c.affected_file.is_none());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_to_compile_without_detail() {
        let classifier = LogClassifier::new();
        let log = "Failed to compile\n";

        match classifier.classify(log) {
            LogAssessment::Errored(c) => {
                assert_eq!(c.category, ErrorCategory::CompileFailure);
                assert_eq!(c.message, "Failed to compile");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_classification_display() {
        let classification = ErrorClassification {
            category: ErrorCategory::SyntaxError,
            message: "Unexpected token".to_string(),
            affected_file: Some("app/page.tsx".to_string()),
            line: Some(7),
        };
        assert_eq!(
            classification.to_string(),
            "syntax error: Unexpected token (app/page.tsx:7)"
        );

        let bare = ErrorClassification {
            category: ErrorCategory::Unknown,
            message: "boom".to_string(),
            affected_file: None,
            line: None,
        };
        assert_eq!(bare.to_string(), "unknown error: boom");
    }
}
