//! Signal extraction: turns a raw [`IncidentReport`] into a normalized
//! [`FeatureSet`].

use std::collections::BTreeSet;

use serde::Serialize;

use super::IncidentReport;

/// Words and phrases reported as keyword matches when found in the text.
const DEFAULT_KEYWORDS: &[&str] = &[
    // availability
    "outage",
    "down",
    "unavailable",
    "complete failure",
    "total failure",
    "partial failure",
    "emergency",
    "p0",
    "sev1",
    // degradation
    "slow",
    "degraded",
    "timeout",
    "latency",
    "performance",
    "memory leak",
    "error rate",
    "failing",
    "p1",
    "sev2",
    // security
    "security",
    "breach",
    "data breach",
    "security breach",
    "unauthorized access",
    "intrusion",
    "malware",
    "exploit",
    "ddos",
    "phishing",
    "hack",
    "sql injection",
    // general trouble
    "warning",
    "issue",
    "problem",
    "p2",
    "sev3",
    // cosmetic
    "minor",
    "cosmetic",
    "p3",
    "sev4",
];

/// Normalized signal extracted from one incident report.
///
/// Every collection is a `BTreeSet` so that iteration order, and therefore
/// everything derived from a feature set, is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    tokens: BTreeSet<String>,
    systems: BTreeSet<String>,
    indicators: BTreeSet<String>,
    keywords: BTreeSet<String>,
}

impl FeatureSet {
    /// Assemble a feature set from already-extracted parts. Tags are
    /// normalized the same way [`SignalExtractor::extract`] normalizes them.
    pub fn new<T, S, I, K>(tokens: T, systems: S, indicators: I, keywords: K) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            tokens: normalize_tags(tokens),
            systems: normalize_tags(systems),
            indicators: normalize_tags(indicators),
            keywords: normalize_tags(keywords),
        }
    }

    pub fn tokens(&self) -> &BTreeSet<String> {
        &self.tokens
    }

    pub fn systems(&self) -> &BTreeSet<String> {
        &self.systems
    }

    pub fn indicators(&self) -> &BTreeSet<String> {
        &self.indicators
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    /// True if `signal` is a token, system, indicator or keyword match.
    pub fn has_signal(&self, signal: &str) -> bool {
        self.tokens.contains(signal)
            || self.systems.contains(signal)
            || self.indicators.contains(signal)
            || self.keywords.contains(signal)
    }

    /// Union of every signal in the set.
    pub fn signals(&self) -> BTreeSet<&str> {
        self.tokens
            .iter()
            .chain(&self.systems)
            .chain(&self.indicators)
            .chain(&self.keywords)
            .map(String::as_str)
            .collect()
    }
}

/// Extracts feature sets using a keyword lexicon.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    /// Each lexicon entry pre-tokenized; a phrase matches when its tokens
    /// appear contiguously in one text field.
    lexicon: Vec<(String, Vec<String>)>,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

impl SignalExtractor {
    pub fn new<I>(keywords: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut lexicon = Vec::new();
        for keyword in keywords {
            let parts = tokenize(keyword.as_ref());
            if parts.is_empty() {
                continue;
            }
            lexicon.push((parts.join(" "), parts));
        }
        Self { lexicon }
    }

    /// Extract the feature set for `report`. Pure: the same report always
    /// yields the same feature set.
    pub fn extract(&self, report: &IncidentReport) -> FeatureSet {
        let fields: Vec<Vec<String>> = [
            Some(report.title.as_str()),
            Some(report.description.as_str()),
            report.error_logs.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(tokenize)
        .collect();

        let mut keywords = BTreeSet::new();
        for (keyword, parts) in &self.lexicon {
            let found = fields
                .iter()
                .any(|field| field.windows(parts.len()).any(|w| w == parts.as_slice()));
            if found {
                keywords.insert(keyword.clone());
            }
        }

        FeatureSet {
            tokens: fields.into_iter().flatten().collect(),
            systems: normalize_tags(&report.affected_systems),
            indicators: normalize_tags(&report.severity_indicators),
            keywords,
        }
    }
}

/// Extract with the built-in lexicon.
pub fn extract(report: &IncidentReport) -> FeatureSet {
    SignalExtractor::default().extract(report)
}

/// Case-fold `text`, split on non-alphanumeric boundaries and drop tokens
/// shorter than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn normalize_tags<I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
