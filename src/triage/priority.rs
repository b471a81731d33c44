//! Security detection and impact-scope priority.

use super::extract::FeatureSet;
use super::SeverityLevel;

/// Terms that mark an incident as security related when found inside any
/// token, keyword or indicator.
const SECURITY_TERMS: &[&str] = &[
    "security",
    "breach",
    "unauthorized",
    "hack",
    "malware",
    "virus",
    "intrusion",
    "vulnerability",
    "exploit",
    "attack",
    "suspicious",
    "authentication",
    "authorization",
    "privilege",
    "injection",
    "xss",
    "csrf",
    "ddos",
    "phishing",
];

/// System tags that make an incident security related on their own.
const SECURITY_SYSTEMS: &[&str] = &["auth", "security", "firewall"];

/// True if the report touches a security system or mentions a security term.
pub fn is_security_incident(features: &FeatureSet) -> bool {
    let security_system = features
        .systems()
        .iter()
        .any(|system| SECURITY_SYSTEMS.iter().any(|s| system.contains(s)));
    security_system
        || features
            .signals()
            .into_iter()
            .any(|signal| SECURITY_TERMS.iter().any(|t| signal.contains(t)))
}

fn severity_weight(severity: SeverityLevel) -> u64 {
    match severity {
        SeverityLevel::Low => 1,
        SeverityLevel::Medium => 10,
        SeverityLevel::High => 100,
        SeverityLevel::Critical => 1000,
    }
}

/// Severity weight scaled by the number of affected systems (at least one),
/// doubled for security incidents.
pub fn priority_score(severity: SeverityLevel, affected_systems: usize, security_incident: bool) -> u64 {
    let scope = affected_systems.max(1) as u64;
    let security = if security_incident { 2 } else { 1 };
    severity_weight(severity) * scope * security
}
