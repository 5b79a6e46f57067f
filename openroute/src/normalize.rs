//! Pure path transformations: segment tokenization, placeholder detection
//! across delimiter styles, singular/plural folding and edit distance.

use once_cell::sync::Lazy;
use regex::Regex;

/// `{name}`, `:name` or `<name>` spanning a whole segment.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\{([\w.\-]+)\}|:([\w.\-]+)|<([\w.\-]+)>)$").expect("valid regex")
});

/// Result of classifying a single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub is_placeholder: bool,
    pub name: Option<String>,
}

#[must_use]
pub fn normalize_placeholder(segment: &str) -> Placeholder {
    let name = PLACEHOLDER_RE.captures(segment).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
    });
    Placeholder {
        is_placeholder: name.is_some(),
        name,
    }
}

/// One `/`-separated piece of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    raw: String,
    key: String,
    placeholder: Option<String>,
}

impl Segment {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            key: raw.to_lowercase(),
            placeholder: normalize_placeholder(raw).name,
        }
    }

    /// Text as written, for display and value capture.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lower-cased comparison form.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    #[must_use]
    pub fn placeholder_name(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }
}

/// Split a path into segments, ignoring leading, trailing and repeated
/// slashes.
#[must_use]
pub fn canonicalize(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(Segment::parse)
        .collect()
}

#[must_use]
pub fn placeholder_names(path: &str) -> Vec<String> {
    canonicalize(path)
        .into_iter()
        .filter_map(|s| s.placeholder)
        .collect()
}

/// Fold a plural word to its singular form. Only the fuzzy stage uses this;
/// exact and normalized matching compare literal text.
#[must_use]
pub fn stem(word: &str) -> String {
    let shortened = if let Some(base) = word.strip_suffix("ies") {
        format!("{base}y")
    } else if ["ses", "xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        word[..word.len() - 2].to_string()
    } else if word.ends_with("ss") {
        return word.to_string();
    } else if let Some(base) = word.strip_suffix('s') {
        base.to_string()
    } else {
        return word.to_string();
    };

    if shortened.chars().count() >= 3 {
        shortened
    } else {
        word.to_string()
    }
}

/// Character-level Levenshtein distance.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
