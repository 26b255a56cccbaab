#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Locating JSON inside free-form model output.

/// Returns the span starting at byte `start` (which must hold `open`) and
/// ending at its matching `close`, ignoring delimiters inside JSON strings.
fn balanced_from(text: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                let end = start + offset + c.len_utf8();
                return Some(&text[start..end]);
            }
        }
    }
    None
}

/// Candidate JSON spans delimited by `open`/`close`, most likely first.
///
/// Each `open` that is not nested inside an earlier balanced span starts a
/// candidate. When no delimiter ever balances, the span from the first
/// `open` to the last `close` is the only candidate.
pub fn candidate_spans(text: &str, open: char, close: char) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(open) {
        let start = cursor + found;
        match balanced_from(text, start, open, close) {
            Some(span) => {
                spans.push(span);
                cursor = start + span.len();
            }
            None => cursor = start + open.len_utf8(),
        }
    }

    if spans.is_empty()
        && let (Some(first), Some(last)) = (text.find(open), text.rfind(close))
        && last > first
    {
        spans.push(&text[first..last + close.len_utf8()]);
    }
    spans
}

/// Returns the outermost balanced span, if any.
pub fn outermost_span(text: &str, open: char, close: char) -> Option<&str> {
    candidate_spans(text, open, close).into_iter().next()
}

/// Content of the first ```` ```json ```` block, else the first bare
/// ```` ``` ```` block.
pub fn fenced_block(text: &str) -> Option<&str> {
    const FENCE: &str = "```";

    let tagged = text.find("```json").map(|i| i + "```json".len());
    let body_start = match tagged {
        Some(start) => start,
        None => {
            let start = text.find(FENCE)? + FENCE.len();
            // Skip an info string such as `JSON` or `javascript`.
            let line_end = text[start..].find('\n').map_or(start, |i| start + i);
            if text[start..line_end].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
                line_end
            } else {
                start
            }
        }
    };

    let body_end = body_start + text[body_start..].find(FENCE)?;
    Some(text[body_start..body_end].trim())
}

/// Single cleanup pass applied before the second parse attempt: prefer a
/// fenced block, else the outermost object span, then blank out control
/// characters.
pub fn cleanup(text: &str) -> String {
    let focused = fenced_block(text)
        .filter(|block| block.contains('{'))
        .or_else(|| outermost_span(text, '{', '}'))
        .unwrap_or(text);

    focused
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
