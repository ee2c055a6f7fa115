//! Fuzzy location of a quote inside a page's lines.
//!
//! Every start line is grown downwards one line at a time and the joined text
//! is scored against the quote with a bigram Dice coefficient. Growth from a
//! start line stops once the joined text is more than [`GROWTH_LIMIT`] times
//! as long as the quote.

use std::collections::HashMap;
use std::ops::Range;

use crate::model::{Line, TextToken};

/// Score reported when there is no candidate span at all.
pub const NO_CANDIDATE: f32 = -1.0;

/// Maximum length of a candidate span relative to the quote.
pub const GROWTH_LIMIT: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: f32,
    /// Half-open range of line indices.
    pub span: Range<usize>,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            score: NO_CANDIDATE,
            span: 0..0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn lines<'l, 'a>(&self, lines: &'l [Line<'a>]) -> &'l [Line<'a>] {
        lines.get(self.span.clone()).unwrap_or(&[])
    }

    pub fn tokens<'a>(&self, lines: &[Line<'a>]) -> Vec<&'a TextToken> {
        self.lines(lines)
            .iter()
            .flat_map(|line| line.tokens.iter())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchPolicy {
    /// Accept the global best span whatever its score.
    BestEffort,
    /// Accept only spans scoring strictly above the threshold.
    Threshold(f32),
}

impl MatchPolicy {
    pub fn accepts(&self, result: &MatchResult) -> bool {
        if result.is_empty() {
            return false;
        }
        match self {
            MatchPolicy::BestEffort => true,
            MatchPolicy::Threshold(threshold) => result.score > *threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(MatchResult),
    NoMatch { best_score: f32 },
}

impl MatchOutcome {
    pub fn score(&self) -> f32 {
        match self {
            MatchOutcome::Matched(result) => result.score,
            MatchOutcome::NoMatch { best_score } => *best_score,
        }
    }
}

/// Returns the best-scoring contiguous span of lines, whatever its score.
///
/// Ties keep the earliest span. A page without text, or an empty quote,
/// yields [`MatchResult::none`].
pub fn locate(lines: &[Line<'_>], quote: &str) -> MatchResult {
    let needle = quote.trim().to_lowercase();
    if needle.is_empty() {
        return MatchResult::none();
    }

    let texts: Vec<String> = lines
        .iter()
        .map(|line| line.text().trim().to_lowercase())
        .collect();
    if texts.iter().all(|text| text.is_empty()) {
        return MatchResult::none();
    }

    let limit = needle.chars().count() as f32 * GROWTH_LIMIT;
    let mut best = MatchResult::none();

    for start in 0..texts.len() {
        let mut combined = String::new();
        let mut combined_len = 0usize;
        for end in start..texts.len() {
            let text = &texts[end];
            if !text.is_empty() {
                if !combined.is_empty() {
                    combined.push(' ');
                    combined_len += 1;
                }
                combined.push_str(text);
                combined_len += text.chars().count();
            }
            if combined.is_empty() {
                continue;
            }

            let score = similarity(&combined, &needle);
            if score > best.score {
                best = MatchResult {
                    score,
                    span: start..end + 1,
                };
            }

            if combined_len as f32 > limit {
                break;
            }
        }
    }

    best
}

/// Runs [`locate`] and applies the acceptance policy.
pub fn locate_with(lines: &[Line<'_>], quote: &str, policy: MatchPolicy) -> MatchOutcome {
    let result = locate(lines, quote);
    if policy.accepts(&result) {
        MatchOutcome::Matched(result)
    } else {
        MatchOutcome::NoMatch {
            best_score: result.score,
        }
    }
}

/// Sørensen–Dice coefficient over character bigrams, ignoring whitespace.
///
/// Identical strings score 1.0, strings without a shared bigram score 0.0.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *counts.entry((pair[0], pair[1])).or_default() += 1;
    }

    let mut shared = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = counts.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f32 / (a.len() + b.len() - 2) as f32
}
