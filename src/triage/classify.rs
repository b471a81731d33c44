//! Rule-table severity classification.
//!
//! Rules are plain data: a [`Condition`], the severity it assigns and a
//! specificity rank. The classifier orders the table once, most specific
//! first and, within one specificity, highest severity first; the first rule
//! whose condition holds decides. With no match the severity is `low`.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::extract::FeatureSet;
use super::SeverityLevel;

/// Predicate over a [`FeatureSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Every listed signal is present.
    AllSignals(Vec<String>),
    /// At least one listed signal is present.
    AnySignal(Vec<String>),
    /// Every listed tag was supplied by the reporter as a severity indicator.
    AllIndicators(Vec<String>),
    /// At least this many distinct affected systems.
    MinSystems(usize),
}

impl Condition {
    pub fn matches(&self, features: &FeatureSet) -> bool {
        match self {
            Condition::AllSignals(signals) => {
                !signals.is_empty() && signals.iter().all(|s| features.has_signal(s))
            }
            Condition::AnySignal(signals) => signals.iter().any(|s| features.has_signal(s)),
            Condition::AllIndicators(tags) => {
                !tags.is_empty() && tags.iter().all(|t| features.indicators().contains(t))
            }
            Condition::MinSystems(n) => *n > 0 && features.systems().len() >= *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub name: String,
    pub condition: Condition,
    pub severity: SeverityLevel,
    /// Higher is more specific and is evaluated first.
    pub specificity: u8,
}

impl SeverityRule {
    pub fn new(
        name: impl Into<String>,
        condition: Condition,
        severity: SeverityLevel,
        specificity: u8,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            severity,
            specificity,
        }
    }
}

/// Rank used for rules keyed on a combination of reporter indicators.
pub const SPECIFICITY_EXACT_INDICATORS: u8 = 25;
/// Rank used for rules keyed on a combination of signals.
pub const SPECIFICITY_COMBINATION: u8 = 20;
/// Rank used for rules keyed on a single signal or a system count.
pub const SPECIFICITY_SINGLE: u8 = 10;

#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    rules: Vec<SeverityRule>,
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl SeverityClassifier {
    pub fn new(mut rules: Vec<SeverityRule>) -> Self {
        // Stable sort: rules equal in both keys keep declaration order.
        rules.sort_by_key(|r| (Reverse(r.specificity), Reverse(r.severity)));
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[SeverityRule] {
        &self.rules
    }

    /// The rule that decides the severity for `features`, if any fires.
    pub fn winning_rule(&self, features: &FeatureSet) -> Option<&SeverityRule> {
        self.rules.iter().find(|r| r.condition.matches(features))
    }

    /// Total: always returns a level, `low` when nothing fires.
    pub fn classify(&self, features: &FeatureSet) -> SeverityLevel {
        self.winning_rule(features)
            .map(|r| r.severity)
            .unwrap_or(SeverityLevel::Low)
    }
}

/// Classify with the built-in rule table.
pub fn classify(features: &FeatureSet) -> SeverityLevel {
    SeverityClassifier::default().classify(features)
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn default_rules() -> Vec<SeverityRule> {
    use Condition::*;
    use SeverityLevel::*;

    vec![
        SeverityRule::new(
            "database-outage",
            AllSignals(words(&["critical", "outage", "database"])),
            Critical,
            30,
        ),
        SeverityRule::new(
            "reported-critical-outage",
            AllIndicators(words(&["critical", "outage"])),
            Critical,
            SPECIFICITY_EXACT_INDICATORS,
        ),
        SeverityRule::new(
            "security-breach",
            AllSignals(words(&["security", "breach"])),
            Critical,
            SPECIFICITY_COMBINATION,
        ),
        SeverityRule::new(
            "unauthorized-access",
            AllSignals(words(&["unauthorized access"])),
            Critical,
            SPECIFICITY_COMBINATION,
        ),
        SeverityRule::new(
            "degraded-performance",
            AllSignals(words(&["degraded", "performance"])),
            High,
            SPECIFICITY_COMBINATION,
        ),
        SeverityRule::new(
            "availability-loss",
            AnySignal(words(&[
                "outage",
                "down",
                "unavailable",
                "complete failure",
                "total failure",
                "emergency",
                "p0",
                "sev1",
            ])),
            Critical,
            SPECIFICITY_SINGLE,
        ),
        SeverityRule::new(
            "attack-indicator",
            AnySignal(words(&[
                "breach",
                "intrusion",
                "malware",
                "exploit",
                "ddos",
                "phishing",
                "hack",
                "sql injection",
            ])),
            Critical,
            SPECIFICITY_SINGLE,
        ),
        SeverityRule::new(
            "degradation",
            AnySignal(words(&[
                "slow",
                "degraded",
                "timeout",
                "latency",
                "memory leak",
                "error rate",
                "partial failure",
                "failing",
                "p1",
                "sev2",
            ])),
            High,
            SPECIFICITY_SINGLE,
        ),
        SeverityRule::new("widespread-impact", MinSystems(4), High, SPECIFICITY_SINGLE),
        SeverityRule::new(
            "reported-problem",
            AnySignal(words(&["warning", "issue", "problem", "p2", "sev3"])),
            Medium,
            SPECIFICITY_SINGLE,
        ),
        SeverityRule::new("multi-system", MinSystems(2), Medium, SPECIFICITY_SINGLE),
        SeverityRule::new(
            "cosmetic",
            AnySignal(words(&["minor", "cosmetic", "p3", "sev4"])),
            Low,
            SPECIFICITY_SINGLE,
        ),
    ]
}
