//! Keyword relevance scoring for heterogeneous result records.
//!
//! Used to narrow a raw result list to the handful worth an expensive
//! follow-up fetch. Scoring is a pure function of the record and the
//! keyword list.
//!
//! # Scoring Formula
//!
//! ```text
//! per keyword (case-insensitive substring):
//!     title contains keyword  +3.0
//!     body contains keyword   +1.5
//!     url contains keyword    +1.0
//! url scheme is https         +0.5
//! body shorter than 20 chars  -1.0
//! ```

use std::fmt::Write as _;

use serde::Serialize;

use crate::types::SearchHit;

/// Read access to the three fields the ranker scores.
pub trait Rankable {
    /// Headline text.
    fn title(&self) -> &str;
    /// Body, snippet or description text.
    fn body(&self) -> &str;
    /// Result URL.
    fn url(&self) -> &str;
}

impl Rankable for SearchHit {
    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.snippet
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// JSON records are read by field name. Missing or non-string fields read as
/// empty.
impl Rankable for serde_json::Value {
    fn title(&self) -> &str {
        first_str(self, &["title"])
    }

    fn body(&self) -> &str {
        first_str(self, &["body", "snippet", "description"])
    }

    fn url(&self) -> &str {
        first_str(self, &["url", "href", "link"])
    }
}

fn first_str<'a>(value: &'a serde_json::Value, fields: &[&str]) -> &'a str {
    fields
        .iter()
        .find_map(|field| value.get(*field).and_then(serde_json::Value::as_str))
        .unwrap_or("")
}

/// Score contributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWeights {
    /// Per keyword found in the title.
    pub title: f64,
    /// Per keyword found in the body.
    pub body: f64,
    /// Per keyword found in the URL.
    pub url: f64,
    /// Bonus for an `https` URL.
    pub https_bonus: f64,
    /// Penalty for a body shorter than `min_body_chars`.
    pub short_body_penalty: f64,
    /// Bodies with fewer characters than this are penalised.
    pub min_body_chars: usize,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            title: 3.0,
            body: 1.5,
            url: 1.0,
            https_bonus: 0.5,
            short_body_penalty: 1.0,
            min_body_chars: 20,
        }
    }
}

/// A record paired with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult<R> {
    /// The original record.
    pub result: R,
    /// Relevance score, higher is better.
    pub score: f64,
}

/// Score one record with the default weights.
pub fn score<R: Rankable + ?Sized>(result: &R, keywords: &[String]) -> f64 {
    score_with(result, keywords, &RankWeights::default())
}

/// Score one record with explicit weights.
pub fn score_with<R: Rankable + ?Sized>(
    result: &R,
    keywords: &[String],
    weights: &RankWeights,
) -> f64 {
    let title = result.title().to_lowercase();
    let body = result.body().to_lowercase();
    let url = result.url().to_lowercase();

    let mut total = 0.0;
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        if title.contains(&keyword) {
            total += weights.title;
        }
        if body.contains(&keyword) {
            total += weights.body;
        }
        if url.contains(&keyword) {
            total += weights.url;
        }
    }

    if is_https(result.url()) {
        total += weights.https_bonus;
    }
    if result.body().chars().count() < weights.min_body_chars {
        total -= weights.short_body_penalty;
    }
    total
}

fn is_https(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|parsed| parsed.scheme() == "https")
}

/// Score every record and sort by descending score.
///
/// The sort is stable: records with equal scores keep their input order.
pub fn rank<R: Rankable>(results: Vec<R>, keywords: &[String]) -> Vec<ScoredResult<R>> {
    rank_with(results, keywords, &RankWeights::default())
}

/// [`rank`] with explicit weights.
pub fn rank_with<R: Rankable>(
    results: Vec<R>,
    keywords: &[String],
    weights: &RankWeights,
) -> Vec<ScoredResult<R>> {
    let mut scored: Vec<ScoredResult<R>> = results
        .into_iter()
        .map(|result| {
            let score = score_with(&result, keywords, weights);
            ScoredResult { result, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Keywords derived from a free-text query: lower-cased whitespace tokens
/// longer than two characters.
pub fn default_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 2)
        .collect()
}

/// Use `explicit` keywords when given, otherwise derive them from `query`.
pub fn resolve_keywords(explicit: Option<&[String]>, query: &str) -> Vec<String> {
    match explicit {
        Some(keywords) if !keywords.is_empty() => keywords.to_vec(),
        _ => default_keywords(query),
    }
}

/// The first `n` ranked records, for follow-up fetches.
pub fn select_top<R>(ranked: &[ScoredResult<R>], n: usize) -> Vec<&R> {
    ranked.iter().take(n).map(|scored| &scored.result).collect()
}

/// Render ranked records as a numbered markdown list.
///
/// ```text
/// 1. [Title](https://example.com) - snippet
/// ```
pub fn to_markdown<R: Rankable>(ranked: &[ScoredResult<R>]) -> String {
    let mut out = String::new();
    for (idx, scored) in ranked.iter().enumerate() {
        let record = &scored.result;
        let _ = write!(out, "{}. [{}]({})", idx + 1, record.title(), record.url());
        if !record.body().is_empty() {
            let _ = write!(out, " - {}", record.body());
        }
        out.push('\n');
    }
    out
}
