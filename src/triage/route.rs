//! Team routing: (severity, affected systems) to the responsible teams.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::SeverityLevel;
use crate::catalog::{CatalogError, RoutingTable, TeamCatalog, TeamId};

#[derive(Debug, Clone)]
pub struct TeamRouter {
    teams: Arc<TeamCatalog>,
    table: RoutingTable,
}

impl TeamRouter {
    /// Build a router. Fails if the table names a team missing from `teams`.
    pub fn new(teams: Arc<TeamCatalog>, table: RoutingTable) -> Result<Self, CatalogError> {
        for team in table.referenced_teams() {
            teams.ensure_known(team, "routing table")?;
        }
        Ok(Self { teams, table })
    }

    pub fn teams(&self) -> &Arc<TeamCatalog> {
        &self.teams
    }

    /// Route an incident. The result is never empty:
    ///
    /// * a tag is matched on its full name, then on each of its
    ///   non-alphanumeric segments (`payments-db` tries `payments` and `db`);
    /// * a tag that matches nothing routes to the default team;
    /// * no tags at all routes to the default team;
    /// * `critical` always adds the on-call team.
    pub fn route<S>(&self, severity: SeverityLevel, affected_systems: S) -> BTreeSet<TeamId>
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let mut assigned = BTreeSet::new();
        let mut saw_system = false;

        for system in affected_systems {
            let system = system.as_ref().trim().to_lowercase();
            if system.is_empty() {
                continue;
            }
            saw_system = true;

            let matched = self.lookup(&system);
            if matched.is_empty() {
                debug!(%system, fallback = %self.teams.default_team(), "unrecognized system, using default team");
                assigned.insert(self.teams.default_team().clone());
            } else {
                assigned.extend(matched);
            }
        }

        if !saw_system {
            assigned.insert(self.teams.default_team().clone());
        }
        if severity == SeverityLevel::Critical {
            assigned.insert(self.teams.oncall_team().clone());
        }
        assigned
    }

    fn lookup(&self, system: &str) -> BTreeSet<TeamId> {
        if let Some(teams) = self.table.lookup(system) {
            return teams.clone();
        }
        system
            .split(|c: char| !c.is_alphanumeric())
            .filter(|seg| !seg.is_empty())
            .filter_map(|seg| self.table.lookup(seg))
            .flatten()
            .cloned()
            .collect()
    }
}
