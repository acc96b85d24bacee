//! Fuzzy matching of spoken names against bridge names.
//!
//! Scores are on a 0–100 scale and forgive case, punctuation, word order and
//! partial overlap. The final score is the best of several ratios, with the
//! token-based and partial ratios slightly discounted so that an exact
//! character match always ranks first.

use std::collections::BTreeMap;

/// Minimum score (exclusive) for rooms and scenes
pub const MATCH_THRESHOLD: u8 = 90;

const TOKEN_SCALE: f64 = 0.95;

/// Display name → bridge id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, String>,
}

impl Catalog {
    /// Add an entry; a name already present is re-pointed at `id`
    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<String>) {
        self.entries.insert(name.into(), id.into());
    }

    pub fn id(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut catalog = Catalog::default();
        for (name, id) in iter {
            catalog.insert(name, id);
        }
        catalog
    }
}

/// A resolved catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub name: &'a str,
    pub id: &'a str,
}

/// Resolves spoken values against a catalog with a fixed threshold
#[derive(Debug, Clone, Copy)]
pub struct EntityResolver {
    threshold: u8,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(MATCH_THRESHOLD)
    }
}

impl EntityResolver {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn resolve<'a>(&self, query: &str, catalog: &'a Catalog) -> Option<Match<'a>> {
        let (name, id) = catalog
            .entries
            .get_key_value(resolve(query, catalog.names(), self.threshold)?)?;
        Some(Match { name, id })
    }
}

/// Best candidate whose score is strictly above `threshold`
///
/// Ties keep the earliest candidate.
pub fn resolve<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    threshold: u8,
) -> Option<&'a str> {
    let mut best: Option<(&'a str, u8)> = None;
    for candidate in candidates {
        let score = similarity(query, candidate);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    let (name, score) = best?;
    tracing::debug!("Best match for {:?} is {:?} ({})", query, name, score);
    (score > threshold).then_some(name)
}

/// Weighted similarity of two strings, 0–100
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let base = ratio(&a, &b);

    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let length_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;

    let best = if length_ratio < 1.5 {
        base.max(token_sort_ratio(&a, &b, ratio) * TOKEN_SCALE)
            .max(token_set_ratio(&a, &b, ratio) * TOKEN_SCALE)
    } else {
        let partial_scale = if length_ratio <= 8.0 { 0.9 } else { 0.6 };
        base.max(partial_ratio(&a, &b) * partial_scale)
            .max(token_sort_ratio(&a, &b, partial_ratio) * TOKEN_SCALE * partial_scale)
            .max(token_set_ratio(&a, &b, partial_ratio) * TOKEN_SCALE * partial_scale)
    };

    best.round_ties_even().clamp(0.0, 100.0) as u8
}

/// Lower-case, punctuation to spaces, trimmed
fn normalize(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.trim().to_lowercase()
}

/// Indel ratio: twice the common subsequence length over the summed lengths
fn ratio(a: &str, b: &str) -> f64 {
    rapidfuzz::fuzz::ratio(a.chars(), b.chars()) * 100.0
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_sort_ratio(a: &str, b: &str, score: fn(&str, &str) -> f64) -> f64 {
    score(&sorted_tokens(a), &sorted_tokens(b))
}

/// Compares the shared tokens against each side's full token set
fn token_set_ratio(a: &str, b: &str, score: fn(&str, &str) -> f64) -> f64 {
    let tokens_a: std::collections::BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: std::collections::BTreeSet<&str> = b.split_whitespace().collect();

    let common = join(tokens_a.intersection(&tokens_b));
    let only_a = join(tokens_a.difference(&tokens_b));
    let only_b = join(tokens_b.difference(&tokens_a));

    let with_a = format!("{} {}", common, only_a).trim().to_string();
    let with_b = format!("{} {}", common, only_b).trim().to_string();

    let mut best = score(&with_a, &with_b);
    if !common.is_empty() {
        best = best.max(score(&common, &with_a)).max(score(&common, &with_b));
    }
    best
}

fn join<'a>(tokens: impl Iterator<Item = &'a &'a str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

/// Best ratio of the shorter string against every equally long window of
/// the longer one
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let long_chars: Vec<char> = long.chars().collect();
    let window = short.chars().count();
    if window == 0 {
        return 0.0;
    }

    long_chars
        .windows(window)
        .map(|w| ratio(short, &w.iter().collect::<String>()))
        .fold(0.0, f64::max)
}
