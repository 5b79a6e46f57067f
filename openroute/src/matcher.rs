//! The matching cascade.
//!
//! A requested `(method, path)` is tried against the catalog by five
//! strategies in strict order: exact, normalized, positional, fuzzy and,
//! when nothing else produced a candidate, ranked suggestions. The first
//! stage that yields a candidate ends the cascade.
//!
//! Every comparison that can tie has an explicit tie-break, so the same
//! catalog and input always produce the same outcome.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::catalog::{Catalog, EndpointTemplate, HttpMethod};
use crate::normalize::{canonicalize, levenshtein, stem, Segment};

/// Cost of each segment the request has more or fewer of than a template.
pub const SEGMENT_PENALTY: u32 = 2;
/// Cost of a template declared under a different method.
pub const METHOD_PENALTY: u32 = 5;
/// Highest fuzzy distance that still counts as a match.
pub const FUZZY_THRESHOLD: u32 = 2;
/// Segment-count difference tolerated by the fuzzy stage.
pub const FUZZY_SEGMENT_TOLERANCE: usize = 1;
/// Number of hints returned when nothing matches.
pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Exact,
    Normalized,
    Positional,
    Fuzzy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Exact => "EXACT",
            Stage::Normalized => "NORMALIZED",
            Stage::Positional => "POSITIONAL",
            Stage::Fuzzy => "FUZZY",
        })
    }
}

/// A concrete value found in the request where the template has a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCapture {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate<'c> {
    pub template: &'c EndpointTemplate,
    /// Lower is better. Zero for exact and normalized matches, the number of
    /// captured values for positional ones, the fuzzy distance otherwise.
    pub score: u32,
    /// Left-to-right captures; only the positional stage fills this.
    pub captured: Vec<PathCapture>,
    pub stage: Stage,
}

impl MatchCandidate<'_> {
    #[must_use]
    pub fn captured_values(&self) -> Vec<&str> {
        self.captured.iter().map(|c| c.value.as_str()).collect()
    }

    #[must_use]
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captured
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion<'c> {
    pub template: &'c EndpointTemplate,
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome<'c> {
    Matched(MatchCandidate<'c>),
    /// Several templates are equally good; the cascade never guesses.
    Ambiguous {
        stage: Stage,
        candidates: Vec<&'c EndpointTemplate>,
    },
    /// Terminal: nothing is executable. Carries at most [`MAX_SUGGESTIONS`]
    /// hints sorted by ascending distance.
    NoMatch { suggestions: Vec<Suggestion<'c>> },
}

/// Run the cascade for one request.
#[must_use]
pub fn match_route<'c>(catalog: &'c Catalog, method: HttpMethod, path: &str) -> MatchOutcome<'c> {
    let endpoints = catalog.endpoints();
    let requested = canonicalize(path);

    let exact: Vec<&EndpointTemplate> = endpoints
        .iter()
        .filter(|t| t.method() == method && t.path() == path)
        .collect();
    debug!(stage = %Stage::Exact, candidates = exact.len(), "cascade stage evaluated");
    if let Some(outcome) = settle(Stage::Exact, exact) {
        return outcome;
    }

    let normalized: Vec<&EndpointTemplate> = endpoints
        .iter()
        .filter(|t| t.method() == method && normalized_equal(&requested, t.segments()))
        .collect();
    debug!(stage = %Stage::Normalized, candidates = normalized.len(), "cascade stage evaluated");
    if let Some(outcome) = settle(Stage::Normalized, normalized) {
        return outcome;
    }

    if let Some(outcome) = positional_stage(endpoints, method, &requested) {
        return outcome;
    }

    if let Some(outcome) = fuzzy_stage(endpoints, method, &requested) {
        return outcome;
    }

    MatchOutcome::NoMatch {
        suggestions: suggest(catalog, method, path),
    }
}

/// Single candidate → match, several → ambiguous, none → continue.
fn settle<'c>(stage: Stage, candidates: Vec<&'c EndpointTemplate>) -> Option<MatchOutcome<'c>> {
    match candidates.len() {
        0 => None,
        1 => Some(MatchOutcome::Matched(MatchCandidate {
            template: candidates[0],
            score: 0,
            captured: Vec::new(),
            stage,
        })),
        _ => Some(MatchOutcome::Ambiguous { stage, candidates }),
    }
}

fn normalized_equal(requested: &[Segment], template: &[Segment]) -> bool {
    requested.len() == template.len()
        && requested.iter().zip(template).all(|(r, t)| {
            match (r.is_placeholder(), t.is_placeholder()) {
                (true, true) => true,
                (false, false) => r.key() == t.key(),
                _ => false,
            }
        })
}

/// Align a request carrying concrete values against a template. Returns the
/// captures when every literal lines up and at least one value was captured.
fn positional_captures(requested: &[Segment], template: &[Segment]) -> Option<Vec<PathCapture>> {
    if requested.len() != template.len() {
        return None;
    }
    let mut captured = Vec::new();
    for (r, t) in requested.iter().zip(template) {
        match (t.placeholder_name(), r.is_placeholder()) {
            (Some(name), false) => captured.push(PathCapture {
                name: name.to_string(),
                value: r.raw().to_string(),
            }),
            (Some(_), true) => {}
            (None, false) if r.key() == t.key() => {}
            (None, _) => return None,
        }
    }
    if captured.is_empty() {
        None
    } else {
        Some(captured)
    }
}

/// Literal segments sort before placeholders, position by position, so the
/// template pinning more of the request's prefix wins.
fn specificity(template: &EndpointTemplate) -> Vec<bool> {
    template
        .segments()
        .iter()
        .map(Segment::is_placeholder)
        .collect()
}

fn positional_stage<'c>(
    endpoints: &'c [EndpointTemplate],
    method: HttpMethod,
    requested: &[Segment],
) -> Option<MatchOutcome<'c>> {
    let mut candidates: Vec<MatchCandidate<'c>> = endpoints
        .iter()
        .filter(|t| t.method() == method)
        .filter_map(|t| {
            positional_captures(requested, t.segments()).map(|captured| MatchCandidate {
                template: t,
                score: u32::try_from(captured.len()).unwrap_or(u32::MAX),
                captured,
                stage: Stage::Positional,
            })
        })
        .collect();
    debug!(stage = %Stage::Positional, candidates = candidates.len(), "cascade stage evaluated");

    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by_key(|c| specificity(c.template));

    let best = specificity(candidates[0].template);
    let tied = candidates
        .iter()
        .take_while(|c| specificity(c.template) == best)
        .count();
    if tied > 1 {
        return Some(MatchOutcome::Ambiguous {
            stage: Stage::Positional,
            candidates: candidates.iter().take(tied).map(|c| c.template).collect(),
        });
    }
    candidates.into_iter().next().map(MatchOutcome::Matched)
}

fn segment_distance(requested: &Segment, template: &Segment) -> u32 {
    if requested.is_placeholder() || template.is_placeholder() {
        return 0;
    }
    let d = levenshtein(&stem(requested.key()), &stem(template.key()));
    u32::try_from(d).unwrap_or(u32::MAX)
}

fn segment_count_difference(requested: &[Segment], template: &[Segment]) -> usize {
    requested.len().abs_diff(template.len())
}

/// Similarity between a request and a template. Zero means the request is
/// the template up to case, pluralization and placeholder values.
#[must_use]
pub fn fuzzy_distance(requested: &[Segment], method: HttpMethod, template: &EndpointTemplate) -> u32 {
    let segments = template.segments();
    let aligned = requested
        .iter()
        .zip(segments)
        .fold(0u32, |acc, (r, t)| acc.saturating_add(segment_distance(r, t)));
    let extra = u32::try_from(segment_count_difference(requested, segments)).unwrap_or(u32::MAX);
    let method_cost = if method == template.method() {
        0
    } else {
        METHOD_PENALTY
    };
    aligned
        .saturating_add(extra.saturating_mul(SEGMENT_PENALTY))
        .saturating_add(method_cost)
}

fn literal_skeleton(template: &EndpointTemplate) -> Vec<&str> {
    template
        .segments()
        .iter()
        .filter(|s| !s.is_placeholder())
        .map(Segment::key)
        .collect()
}

fn fuzzy_order(a: &(u32, &EndpointTemplate), b: &(u32, &EndpointTemplate)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.path().len().cmp(&b.1.path().len()))
        .then_with(|| a.1.path().cmp(b.1.path()))
        .then_with(|| a.1.method().cmp(&b.1.method()))
}

fn fuzzy_stage<'c>(
    endpoints: &'c [EndpointTemplate],
    method: HttpMethod,
    requested: &[Segment],
) -> Option<MatchOutcome<'c>> {
    let mut accepted: Vec<(u32, &'c EndpointTemplate)> = endpoints
        .iter()
        .filter(|t| segment_count_difference(requested, t.segments()) <= FUZZY_SEGMENT_TOLERANCE)
        .map(|t| (fuzzy_distance(requested, method, t), t))
        .filter(|(distance, _)| *distance <= FUZZY_THRESHOLD)
        .collect();
    debug!(stage = %Stage::Fuzzy, candidates = accepted.len(), "cascade stage evaluated");

    if accepted.is_empty() {
        return None;
    }
    accepted.sort_by(fuzzy_order);

    let (best_distance, best) = accepted[0];
    let skeleton = literal_skeleton(best);
    let tied: Vec<&'c EndpointTemplate> = accepted
        .iter()
        .filter(|(d, t)| {
            *d == best_distance
                && t.path().len() == best.path().len()
                && literal_skeleton(t) == skeleton
        })
        .map(|(_, t)| *t)
        .collect();
    if tied.len() > 1 {
        return Some(MatchOutcome::Ambiguous {
            stage: Stage::Fuzzy,
            candidates: tied,
        });
    }

    Some(MatchOutcome::Matched(MatchCandidate {
        template: best,
        score: best_distance,
        captured: Vec::new(),
        stage: Stage::Fuzzy,
    }))
}

/// Rank every template by fuzzy distance and keep the closest few. Ties
/// fall back to the path string, then the method.
#[must_use]
pub fn suggest<'c>(catalog: &'c Catalog, method: HttpMethod, path: &str) -> Vec<Suggestion<'c>> {
    let requested = canonicalize(path);
    let mut scored: Vec<Suggestion<'c>> = catalog
        .endpoints()
        .iter()
        .map(|t| Suggestion {
            template: t,
            distance: fuzzy_distance(&requested, method, t),
        })
        .collect();
    scored.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.template.path().cmp(b.template.path()))
            .then_with(|| a.template.method().cmp(&b.template.method()))
    });
    scored.truncate(MAX_SUGGESTIONS);
    debug!(suggestions = scored.len(), "no stage matched, returning suggestions");
    scored
}
