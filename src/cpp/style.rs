#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Line-based style heuristics for C++ sources.

use serde::{Deserialize, Serialize};

use crate::constants::{NEUTRAL_STYLE_SCORE, STYLE_ISSUE_PENALTY, STYLE_WEIGHT};

/// Result of the style analysis; a pure function of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleReport {
    /// Score out of 25.
    pub score:       u32,
    /// Problems that cost points, in source order.
    pub issues:      Vec<String>,
    /// Advice that does not cost points, in source order.
    pub suggestions: Vec<String>,
}

impl StyleReport {
    /// Builds a report, deriving the score from the issue count.
    pub fn from_findings(issues: Vec<String>, suggestions: Vec<String>) -> Self {
        let penalty = STYLE_ISSUE_PENALTY.saturating_mul(issues.len() as u32);
        Self {
            score: STYLE_WEIGHT.saturating_sub(penalty),
            issues,
            suggestions,
        }
    }

    /// Value used by callers that could not run the analyzer.
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            score:       NEUTRAL_STYLE_SCORE,
            issues:      vec![format!("Style analysis failed: {}", reason.into())],
            suggestions: vec!["Could not perform style analysis".to_string()],
        }
    }
}

/// Headers inferred from the symbols a program uses.
struct IncludeRule {
    /// Identifiers that require the header.
    symbols:  &'static [&'static str],
    /// Whether the symbols only count when called (`sort(`).
    call:     bool,
    /// Any of these headers satisfies the rule.
    headers:  &'static [&'static str],
    /// Issue text when the rule is violated.
    message:  &'static str,
}

/// Missing-include rules checked against every source.
const INCLUDE_RULES: &[IncludeRule] = &[
    IncludeRule {
        symbols: &["cout", "cin", "cerr", "endl"],
        call:    false,
        headers: &["iostream"],
        message: "Missing #include <iostream> for stream input/output",
    },
    IncludeRule {
        symbols: &["vector"],
        call:    false,
        headers: &["vector"],
        message: "Missing #include <vector> for vector usage",
    },
    IncludeRule {
        symbols: &["sort", "find"],
        call:    true,
        headers: &["algorithm"],
        message: "Missing #include <algorithm> for algorithm functions",
    },
    IncludeRule {
        symbols: &["string"],
        call:    false,
        headers: &["string", "iostream"],
        message: "Missing #include <string> for string usage",
    },
];

/// Analyzes `source` and never fails; empty text yields a perfect score.
pub fn analyze(source: &str) -> StyleReport {
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let lines: Vec<&str> = source.lines().collect();
    let mut in_block_comment = false;
    let mut code_lines = Vec::with_capacity(lines.len());
    for line in &lines {
        code_lines.push(strip_comments_and_literals(line, &mut in_block_comment));
    }

    check_indentation(&lines, &code_lines, &mut issues);

    let mut warned_namespace = false;
    for (index, code) in code_lines.iter().enumerate() {
        let number = index + 1;
        if !warned_namespace && code.contains("using namespace std") {
            suggestions.push("Consider avoiding 'using namespace std' in larger programs".into());
            warned_namespace = true;
        }
        for literal in magic_numbers(code) {
            suggestions.push(format!(
                "Line {number}: Consider using named constants instead of magic number {literal}"
            ));
        }
    }

    let included = included_headers(&lines);
    let tokens: Vec<(String, bool)> = code_lines
        .iter()
        .filter(|code| !code.trim_start().starts_with('#'))
        .flat_map(|code| identifiers(code))
        .collect();
    for rule in INCLUDE_RULES {
        let used = tokens.iter().any(|(ident, called)| {
            rule.symbols.contains(&ident.as_str()) && (!rule.call || *called)
        });
        let satisfied = rule
            .headers
            .iter()
            .any(|header| included.iter().any(|h| h == header));
        if used && !satisfied {
            issues.push(rule.message.to_string());
        }
    }

    StyleReport::from_findings(issues, suggestions)
}

/// Flags lines whose space indentation does not follow the file's indent
/// unit, lines mixing tabs and spaces, and files mixing both styles.
fn check_indentation(lines: &[&str], code_lines: &[String], issues: &mut Vec<String>) {
    let leading = |line: &str| -> String {
        line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
    };

    let mut unit = usize::MAX;
    let mut uses_tabs = false;
    let mut uses_spaces = false;
    for (line, code) in lines.iter().zip(code_lines) {
        if code.trim().is_empty() {
            continue;
        }
        let lead = leading(line);
        if lead.is_empty() {
            continue;
        }
        if lead.chars().all(|c| c == ' ') {
            uses_spaces = true;
            unit = unit.min(lead.len());
        } else if lead.chars().all(|c| c == '\t') {
            uses_tabs = true;
        }
    }
    // One-space "indents" are almost always continuation alignment.
    let unit = if unit == usize::MAX || unit < 2 { 4 } else { unit };

    for (index, (line, code)) in lines.iter().zip(code_lines).enumerate() {
        if code.trim().is_empty() {
            continue;
        }
        let lead = leading(line);
        if lead.contains(' ') && lead.contains('\t') {
            issues.push(format!("Line {}: Mixed tabs and spaces in indentation", index + 1));
        } else if lead.chars().all(|c| c == ' ') && lead.len() % unit != 0 {
            issues.push(format!("Line {}: Inconsistent indentation", index + 1));
        }
    }

    if uses_tabs && uses_spaces {
        issues.push("Indentation mixes tab-indented and space-indented lines".to_string());
    }
}

/// Returns the code portion of `line`: comments removed and string/char
/// literal contents blanked. Tracks `/* */` across lines.
fn strip_comments_and_literals(line: &str, in_block_comment: &mut bool) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if *in_block_comment {
            if c == '*' && next == Some('/') {
                *in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        match (c, next) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                *in_block_comment = true;
                i += 2;
            }
            ('"', _) | ('\'', _) => {
                let quote = c;
                out.push(quote);
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                out.push(quote);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Returns the integer literals greater than one on a code line, skipping
/// loop-control, preprocessor, and constant-declaration lines.
fn magic_numbers(code: &str) -> Vec<String> {
    let trimmed = code.trim_start();
    if trimmed.starts_with('#') {
        return Vec::new();
    }

    let words: Vec<(String, bool)> = identifiers(code);
    let skip = words
        .iter()
        .any(|(w, _)| matches!(w.as_str(), "for" | "while" | "const" | "constexpr"));
    if skip {
        return Vec::new();
    }

    words
        .into_iter()
        .map(|(w, _)| w)
        .filter(|w| w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| w.parse::<u64>().map(|n| n > 1).unwrap_or(true))
        .collect()
}

/// Splits a code line into word tokens (identifiers and numbers), each paired
/// with whether it is immediately followed by `(`.
fn identifiers(code: &str) -> Vec<(String, bool)> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_alphanumeric() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            // Skip the fractional part and exponent of floating literals.
            let word: String = chars[start..i].iter().collect();
            let mut j = i;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            let called = chars.get(j) == Some(&'(');
            if chars.get(i) == Some(&'.') && word.chars().all(|c| c.is_ascii_digit()) {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                continue;
            }
            tokens.push((word, called));
        } else {
            i += 1;
        }
    }
    tokens
}

/// Header names from `#include <...>` / `#include "..."` lines.
fn included_headers(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.trim_start().strip_prefix('#'))
        .filter_map(|rest| rest.trim_start().strip_prefix("include"))
        .filter_map(|rest| {
            let rest = rest.trim();
            let inner = rest
                .strip_prefix('<')
                .and_then(|r| r.split('>').next())
                .or_else(|| rest.strip_prefix('"').and_then(|r| r.split('"').next()))?;
            Some(inner.trim().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "#include <iostream>\n#include <vector>\n#include <algorithm>\n\nint \
                         main() {\n    std::vector<int> v;\n    int x;\n    while (std::cin >> \
                         x && x != -999) {\n        v.push_back(x);\n    }\n    \
                         std::sort(v.begin(), v.end());\n    for (int n : v) {\n        \
                         std::cout << n << std::endl;\n    }\n    return 0;\n}\n";

    #[test]
    fn clean_program_scores_full_marks() {
        let report = analyze(CLEAN);
        assert_eq!(report.issues, Vec::<String>::new());
        assert_eq!(report.score, 25);
    }

    #[test]
    fn empty_source_is_bounded() {
        let report = analyze("");
        assert_eq!(report.score, 25);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn missing_includes_cost_points() {
        let report = analyze("int main() {\n    cout << 1;\n    vector<int> v;\n    sort(v.begin(), v.end());\n}\n");
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.score, 16);
    }

    #[test]
    fn score_never_goes_negative() {
        let noisy: String = (0..40).map(|_| "   x = 1;\n    y = 2;\n").collect();
        let report = analyze(&format!("int main() {{\n{noisy}cout << 1;\n}}\n"));
        assert!(report.issues.len() > 9);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn magic_numbers_are_suggestions_outside_loops() {
        let report = analyze("int main() {\n    int limit = 42;\n    for (int i = 0; i < 10; i++) {}\n    const int k = 7;\n    return 0;\n}\n");
        assert_eq!(report.suggestions.len(), 1);
        assert!(report.suggestions[0].contains("magic number 42"));
        assert!(report.suggestions[0].starts_with("Line 2"));
    }

    #[test]
    fn literals_in_comments_and_strings_are_ignored() {
        let report = analyze("int main() {\n    // 99 bottles\n    const char* s = \"404\";\n    /* 500\n       600 */\n    return 0;\n}\n");
        assert!(report.suggestions.is_empty(), "{:?}", report.suggestions);
    }

    #[test]
    fn namespace_std_is_reported_once() {
        let report = analyze("#include <iostream>\nusing namespace std;\nusing namespace std;\n");
        assert_eq!(
            report
                .suggestions
                .iter()
                .filter(|s| s.contains("namespace"))
                .count(),
            1
        );
    }

    #[test]
    fn mixed_indentation_is_an_issue() {
        let report = analyze("int main() {\n\tint a;\n    int b;\n \tint c;\n}\n");
        assert!(report.issues.iter().any(|i| i.contains("Mixed tabs")));
        assert!(report.issues.iter().any(|i| i.contains("mixes tab-indented")));
    }

    #[test]
    fn two_space_indentation_is_consistent() {
        let report = analyze("int main() {\n  int a;\n  if (a) {\n    a = 0;\n  }\n}\n");
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn neutral_report_uses_default_score() {
        assert_eq!(StyleReport::neutral("boom").score, 15);
    }
}
