use regex::Regex;
use std::time::{Duration, Instant};

/// Classification of a pattern after safety screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLevel {
    Ok,
    Warning,
    Danger,
}

#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub pattern: String,
    pub level: SafetyLevel,
    pub compile_ok: bool,
    pub static_flags: Vec<&'static str>,
    pub dynamic_timeout: bool,
    pub timeout_text_preview: Option<String>,
    pub timeout_cost: Option<Duration>,
    pub samples_tested: usize,
}

impl SafetyReport {
    /// Whether the pattern may be persisted. With `strict`, warnings are
    /// treated the same as danger.
    pub fn is_safe(&self, strict: bool) -> bool {
        match self.level {
            SafetyLevel::Ok => true,
            SafetyLevel::Warning => !strict,
            SafetyLevel::Danger => false,
        }
    }
}

/// Static + bounded-time dynamic screening of candidate patterns.
///
/// The static rules deliberately over-report: a flagged pattern is at least
/// a warning even when the stress tests pass. A nested quantifier group is
/// danger outright.
pub struct SafetyAnalyzer {
    nested_quantifier_re: Regex,
    large_alternation_re: Regex,
    adjacent_quantified_re: Regex,
    anchored_re: Regex,
    budget: Duration,
}

impl SafetyAnalyzer {
    pub fn new(budget: Duration) -> Self {
        Self {
            // A group containing a quantifier, itself quantified: (x+)+ and kin.
            nested_quantifier_re: Regex::new(r"\((?:[^()]*?[+*?][^()]*)\)[+*?]")
                .expect("meta pattern is valid"),
            large_alternation_re: Regex::new(r"\((?:[^()]*\|){3,}[^()]*\)[+*?]")
                .expect("meta pattern is valid"),
            adjacent_quantified_re: Regex::new(
                r"(?:\(\?:[^)]*?\w[+*][^)]*\)[+*])\s*(?:\\w[+*]|\(\?:[^)]*?\\w[^)]*\)[+*])",
            )
            .expect("meta pattern is valid"),
            anchored_re: Regex::new(r"^\^|\$$").expect("meta pattern is valid"),
            budget,
        }
    }

    pub fn analyze(&self, pattern: &str, sample_texts: &[String]) -> SafetyReport {
        let static_flags = self.static_red_flags(pattern);

        let compiled = match Regex::new(pattern) {
            Ok(re) => re,
            Err(_) => {
                return SafetyReport {
                    pattern: pattern.to_string(),
                    level: SafetyLevel::Danger,
                    compile_ok: false,
                    static_flags,
                    dynamic_timeout: false,
                    timeout_text_preview: None,
                    timeout_cost: None,
                    samples_tested: 0,
                };
            }
        };

        let tests = make_test_strings(pattern, sample_texts);
        let mut dynamic_timeout = false;
        let mut timeout_text_preview = None;
        let mut timeout_cost = None;
        let mut tested = 0;

        for text in &tests {
            if text.is_empty() {
                continue;
            }
            let start = Instant::now();
            let _ = compiled.find(text);
            let cost = start.elapsed();
            if cost > self.budget {
                dynamic_timeout = true;
                timeout_text_preview = Some(text.chars().take(200).collect());
                timeout_cost = Some(cost);
                break;
            }
            tested += 1;
        }

        let level = if dynamic_timeout {
            SafetyLevel::Danger
        } else if static_flags.contains(&"nested_quantifier_group") {
            SafetyLevel::Danger
        } else if !static_flags.is_empty() {
            SafetyLevel::Warning
        } else {
            SafetyLevel::Ok
        };

        SafetyReport {
            pattern: pattern.to_string(),
            level,
            compile_ok: true,
            static_flags,
            dynamic_timeout,
            timeout_text_preview,
            timeout_cost,
            samples_tested: tested,
        }
    }

    fn static_red_flags(&self, pattern: &str) -> Vec<&'static str> {
        let mut flags = Vec::new();

        if self.nested_quantifier_re.is_match(pattern) {
            flags.push("nested_quantifier_group");
        }
        if pattern.contains(".*.*") || pattern.contains(".*.+") || pattern.contains(".+.*") {
            flags.push("multiple_dot_star_like");
        }
        if self.large_alternation_re.is_match(pattern) {
            flags.push("large_alternation_with_quantifier");
        }
        if pattern.len() > 120 && !self.anchored_re.is_match(pattern) {
            flags.push("long_unanchored_pattern");
        }
        if self.adjacent_quantified_re.is_match(pattern) {
            flags.push("adjacent_quantified_words");
        }

        flags
    }
}

/// Stress corpus: the caller's samples, generic short/mid/long strings,
/// repeated-NUMNUM expansions when the pattern uses the placeholder, and
/// inflated copies of the samples.
fn make_test_strings(pattern: &str, sample_texts: &[String]) -> Vec<String> {
    fn push_unique(t: String, tests: &mut Vec<String>) {
        if !t.is_empty() && !tests.contains(&t) {
            tests.push(t);
        }
    }

    let mut tests: Vec<String> = Vec::new();

    for t in sample_texts {
        push_unique(t.clone(), &mut tests);
    }

    for t in ["a", "0", " ", "NUMNUM", "test"] {
        push_unique(t.to_string(), &mut tests);
    }
    for t in ["a".repeat(64), "0".repeat(64), " ".repeat(64), format!("{}y", "x".repeat(64))] {
        push_unique(t, &mut tests);
    }
    for t in [
        "a".repeat(512),
        "0".repeat(512),
        format!("{}y", "x".repeat(512)),
        " ".repeat(512),
    ] {
        push_unique(t, &mut tests);
    }

    if pattern.contains("NUMNUM") {
        push_unique(" NUMNUM".repeat(64).trim().to_string(), &mut tests);
        push_unique("NUMNUM ".repeat(64).trim().to_string(), &mut tests);
        push_unique(" NUMNUM".repeat(128).trim().to_string(), &mut tests);
    }

    for t in sample_texts {
        if t.is_empty() {
            continue;
        }
        let mut long_t = format!("{} ", t).repeat(5);
        if long_t.chars().count() > 4000 {
            long_t = long_t.chars().take(4000).collect();
        }
        push_unique(long_t, &mut tests);
    }

    tests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SafetyAnalyzer {
        SafetyAnalyzer::new(Duration::from_millis(500))
    }

    #[test]
    fn test_nested_quantifier_is_danger() {
        let report = analyzer().analyze(r"(a+)+$", &[]);
        assert_eq!(report.level, SafetyLevel::Danger);
        assert!(report.static_flags.contains(&"nested_quantifier_group"));
    }

    #[test]
    fn test_anchored_literal_is_ok() {
        let report = analyzer().analyze(r"^foo$", &[]);
        assert_eq!(report.level, SafetyLevel::Ok);
        assert!(report.compile_ok);
        assert!(report.samples_tested > 0);
    }

    #[test]
    fn test_compile_failure_is_danger() {
        let report = analyzer().analyze(r"(unclosed", &[]);
        assert_eq!(report.level, SafetyLevel::Danger);
        assert!(!report.compile_ok);
    }

    #[test]
    fn test_dot_star_run_is_warning() {
        let report = analyzer().analyze(r"^start .*.* end$", &[]);
        assert_eq!(report.level, SafetyLevel::Warning);
        assert!(report.static_flags.contains(&"multiple_dot_star_like"));
    }

    #[test]
    fn test_large_alternation_flagged() {
        let report = analyzer().analyze(r"(alpha|beta|gamma|delta|epsilon)+", &[]);
        assert!(report
            .static_flags
            .contains(&"large_alternation_with_quantifier"));
    }

    #[test]
    fn test_long_unanchored_flagged() {
        let long = format!("{}{}", "abc ".repeat(35), "tail");
        let report = analyzer().analyze(&long, &[]);
        assert!(report.static_flags.contains(&"long_unanchored_pattern"));
        assert_eq!(report.level, SafetyLevel::Warning);
    }

    #[test]
    fn test_strict_mode_rejects_warnings() {
        let report = analyzer().analyze(r"^a .*.* z$", &[]);
        assert_eq!(report.level, SafetyLevel::Warning);
        assert!(report.is_safe(false));
        assert!(!report.is_safe(true));
    }

    #[test]
    fn test_numnum_expansions_included() {
        let tests = make_test_strings("^val NUMNUM$", &[]);
        assert!(tests.iter().any(|t| t.contains("NUMNUM NUMNUM")));
    }
}
