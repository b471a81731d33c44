//! Action recommendation from the runbook catalog.

use std::collections::{BTreeSet, HashSet};

use super::extract::FeatureSet;
use super::SeverityLevel;
use crate::catalog::{IssueCategory, RunbookCatalog};

const AVAILABILITY_SIGNALS: &[&str] = &[
    "outage",
    "down",
    "unavailable",
    "complete failure",
    "total failure",
    "partial failure",
];

const PERFORMANCE_SIGNALS: &[&str] = &[
    "slow",
    "degraded",
    "timeout",
    "latency",
    "performance",
    "memory leak",
    "error rate",
];

const SECURITY_SIGNALS: &[&str] = &[
    "security",
    "breach",
    "unauthorized access",
    "intrusion",
    "malware",
    "exploit",
    "ddos",
    "phishing",
    "hack",
    "sql injection",
];

/// Issue categories suggested by a feature set. `General` is always present.
pub fn categorize(features: &FeatureSet) -> BTreeSet<IssueCategory> {
    let mut categories = BTreeSet::from([IssueCategory::General]);
    let table = [
        (IssueCategory::Availability, AVAILABILITY_SIGNALS),
        (IssueCategory::Performance, PERFORMANCE_SIGNALS),
        (IssueCategory::Security, SECURITY_SIGNALS),
    ];
    for (category, signals) in table {
        if signals.iter().any(|s| features.has_signal(s)) {
            categories.insert(category);
        }
    }
    categories
}

#[derive(Debug, Clone)]
pub struct ActionRecommender {
    runbooks: RunbookCatalog,
}

impl ActionRecommender {
    pub fn new(runbooks: RunbookCatalog) -> Self {
        Self { runbooks }
    }

    /// Recommend actions from the `general` runbooks of each affected system.
    pub fn recommend<S>(&self, severity: SeverityLevel, affected_systems: S) -> Vec<String>
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        self.recommend_for(
            severity,
            affected_systems,
            &BTreeSet::from([IssueCategory::General]),
        )
    }

    /// Recommend actions for the given categories.
    ///
    /// Order: the immediate-response steps (high and critical only), then
    /// each system in lexicographic order, and within a system each category
    /// in declaration order. A step already emitted is not repeated.
    pub fn recommend_for<S>(
        &self,
        severity: SeverityLevel,
        affected_systems: S,
        categories: &BTreeSet<IssueCategory>,
    ) -> Vec<String>
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let systems: BTreeSet<String> = affected_systems
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut seen = HashSet::new();
        let mut actions = Vec::new();
        let mut push = |step: &String| {
            if seen.insert(step.clone()) {
                actions.push(step.clone());
            }
        };

        if severity.needs_escalation() {
            self.runbooks.immediate_steps().iter().for_each(&mut push);
        }
        for system in &systems {
            for category in categories {
                if let Some(steps) = self.runbooks.steps(system, *category) {
                    steps.iter().for_each(&mut push);
                }
            }
        }
        actions
    }
}
