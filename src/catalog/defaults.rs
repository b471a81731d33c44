//! Compiled-in catalog used when the config file does not provide one.

use super::{CatalogConfig, IssueCategory, RouteEntry, RunbookEntry, Team, TeamId};

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            teams: default_teams(),
            default_team: TeamId::new("SRE"),
            oncall_team: TeamId::new("SRE"),
            broader_channel: "#incident-escalations".to_string(),
            routes: default_routes(),
            runbooks: default_runbooks(),
            immediate_steps: vec![
                "Notify primary on-call engineer immediately".to_string(),
                "Open incident bridge".to_string(),
                "Begin impact assessment and customer communication".to_string(),
                "Assign an incident commander".to_string(),
            ],
        }
    }
}

fn default_teams() -> Vec<Team> {
    [
        ("SRE", "#sre-oncall"),
        ("Backend", "#backend-oncall"),
        ("Frontend", "#frontend-oncall"),
        ("Infrastructure", "#infra-oncall"),
        ("Security", "#security-incidents"),
        ("Database", "#dba-oncall"),
        ("Network", "#network-oncall"),
    ]
    .into_iter()
    .map(|(id, channel)| Team {
        id: TeamId::new(id),
        channel: channel.to_string(),
    })
    .collect()
}

fn route(systems: &[&str], teams: &[&str]) -> RouteEntry {
    RouteEntry {
        systems: systems.iter().map(|s| s.to_string()).collect(),
        teams: teams.iter().map(|t| TeamId::new(*t)).collect(),
    }
}

fn default_routes() -> Vec<RouteEntry> {
    vec![
        route(&["database", "db", "postgres", "mysql", "redis"], &["Database", "Backend"]),
        route(&["api", "backend", "service", "payments", "queue"], &["Backend"]),
        route(&["frontend", "web", "ui", "cdn", "mobile"], &["Frontend"]),
        route(
            &["infrastructure", "infra", "kubernetes", "k8s", "deployment", "storage"],
            &["Infrastructure"],
        ),
        route(&["auth", "authentication", "security", "firewall", "iam"], &["Security"]),
        route(&["network", "dns", "loadbalancer", "lb", "vpn"], &["Network"]),
        route(&["monitoring", "alerting", "observability"], &["SRE"]),
    ]
}

fn runbook(system: &str, category: IssueCategory, steps: &[&str]) -> RunbookEntry {
    RunbookEntry {
        system: system.to_string(),
        category,
        steps: steps.iter().map(|s| s.to_string()).collect(),
    }
}

fn default_runbooks() -> Vec<RunbookEntry> {
    use IssueCategory::*;
    vec![
        runbook(
            "database",
            General,
            &[
                "Check database connection pools and query performance",
                "Verify replication lag and primary health",
            ],
        ),
        runbook(
            "database",
            Availability,
            &["Confirm failover status and promote a replica if the primary is down"],
        ),
        runbook(
            "database",
            Performance,
            &["Inspect slow query log and lock contention"],
        ),
        runbook(
            "api",
            General,
            &["Monitor API response times and error rates"],
        ),
        runbook(
            "api",
            Availability,
            &["Check load balancer health checks and upstream instance count"],
        ),
        runbook(
            "api",
            Performance,
            &["Profile hot endpoints and check downstream dependency latency"],
        ),
        runbook(
            "frontend",
            General,
            &["Check frontend deployment status and CDN health"],
        ),
        runbook(
            "infrastructure",
            General,
            &["Review recent infrastructure changes and node health"],
        ),
        runbook(
            "network",
            General,
            &["Check DNS resolution and packet loss between regions"],
        ),
        runbook(
            "auth",
            General,
            &["Check identity provider status and token validation errors"],
        ),
        runbook(
            "auth",
            Security,
            &[
                "Isolate affected systems if possible",
                "Preserve logs and evidence",
                "Rotate exposed credentials",
            ],
        ),
    ]
}
