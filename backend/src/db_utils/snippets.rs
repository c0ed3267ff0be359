//! Snippet span decomposition.
//!
//! The index engine returns highlighted snippets with marker tags around
//! matched terms. Clients get structured spans instead of markup, with each
//! highlighted span numbered.

use common::search_result::HighlightTextSpan;

pub const HIGHLIGHT_PRE: &str = "<digsite_strong>";
pub const HIGHLIGHT_POST: &str = "</digsite_strong>";

pub fn decompose_snippet(text: &str) -> Vec<HighlightTextSpan> {
    let mut spans = decompose(text);
    let mut index = 0;
    for span in spans.iter_mut() {
        if span.is_highlighted {
            span.index = index;
            index += 1;
        }
    }
    spans
}

fn push_span(spans: &mut Vec<HighlightTextSpan>, text: &str, highlighted: bool) {
    if text.is_empty() {
        return;
    }
    // merge runs with the same highlight state so tags split mid-word don't
    // produce confetti spans
    if let Some(last) = spans.last_mut() {
        if last.is_highlighted == highlighted {
            last.text.push_str(text);
            return;
        }
    }
    spans.push(HighlightTextSpan {
        text: text.to_string(),
        is_highlighted: highlighted,
        index: 0,
    });
}

fn decompose(text: &str) -> Vec<HighlightTextSpan> {
    // replacement characters pile up at snippet truncation points
    let text = text.replace("\u{fffd}\u{fffd}", "\u{fffd}");
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if !text.contains(HIGHLIGHT_PRE) {
        return vec![HighlightTextSpan {
            text: text.to_string(),
            is_highlighted: false,
            index: 0,
        }];
    }

    let mut spans = Vec::new();
    let mut depth: usize = 0;
    let mut rest = text;
    loop {
        let next_open = rest.find(HIGHLIGHT_PRE);
        let next_close = rest.find(HIGHLIGHT_POST);
        let (pos, opening) = match (next_open, next_close) {
            (None, None) => break,
            (Some(open), None) => (open, true),
            (None, Some(close)) => (close, false),
            (Some(open), Some(close)) => {
                if open < close {
                    (open, true)
                } else {
                    (close, false)
                }
            }
        };

        push_span(&mut spans, &rest[..pos], depth > 0);
        if opening {
            depth += 1;
            rest = &rest[pos + HIGHLIGHT_PRE.len()..];
        } else if depth > 0 {
            depth -= 1;
            rest = &rest[pos + HIGHLIGHT_POST.len()..];
        } else {
            // stray closer with no opener: keep it as literal text
            push_span(&mut spans, HIGHLIGHT_POST, false);
            rest = &rest[pos + HIGHLIGHT_POST.len()..];
        }
    }
    push_span(&mut spans, rest, depth > 0);
    spans
}
