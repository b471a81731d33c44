//! Static catalogs consumed by the triage pipeline: response teams, the
//! system-to-team routing table, and runbooks.
//!
//! Catalogs are built once from [`CatalogConfig`] (usually part of the TOML
//! config) and then shared read-only behind `Arc`s. Nothing in here is
//! mutable after construction, so tests can substitute their own catalogs.

mod defaults;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("team catalog is empty")]
    NoTeams,
    #[error("team '{0}' is declared more than once")]
    DuplicateTeam(TeamId),
    #[error("{context} references unknown team '{team}'")]
    UnknownTeam { team: TeamId, context: String },
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// Identifier of a response team, e.g. `SRE` or `Backend`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A response team and the channel its notifications go to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub channel: String,
}

/// Lookup of every team the router is allowed to assign.
#[derive(Debug, Clone)]
pub struct TeamCatalog {
    teams: BTreeMap<TeamId, Team>,
    default_team: TeamId,
    oncall_team: TeamId,
    broader_channel: String,
}

impl TeamCatalog {
    /// Build a catalog. Both the default (fallback) team and the on-call team
    /// must be part of `teams`.
    pub fn new(
        teams: Vec<Team>,
        default_team: TeamId,
        oncall_team: TeamId,
        broader_channel: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        if teams.is_empty() {
            return Err(CatalogError::NoTeams);
        }
        let mut by_id = BTreeMap::new();
        for team in teams {
            if by_id.contains_key(&team.id) {
                return Err(CatalogError::DuplicateTeam(team.id));
            }
            by_id.insert(team.id.clone(), team);
        }

        let catalog = Self {
            teams: by_id,
            default_team,
            oncall_team,
            broader_channel: broader_channel.into(),
        };
        catalog.ensure_known(&catalog.default_team, "default_team")?;
        catalog.ensure_known(&catalog.oncall_team, "oncall_team")?;
        Ok(catalog)
    }

    pub fn contains(&self, id: &TeamId) -> bool {
        self.teams.contains_key(id)
    }

    pub fn channel(&self, id: &TeamId) -> Option<&str> {
        self.teams.get(id).map(|t| t.channel.as_str())
    }

    /// Team assigned when no routing entry matches.
    pub fn default_team(&self) -> &TeamId {
        &self.default_team
    }

    /// Team that is always paged for critical incidents.
    pub fn oncall_team(&self) -> &TeamId {
        &self.oncall_team
    }

    /// Channel used for the "broader" escalation audience.
    pub fn broader_channel(&self) -> &str {
        &self.broader_channel
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub(crate) fn ensure_known(&self, id: &TeamId, context: &str) -> Result<(), CatalogError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(CatalogError::UnknownTeam {
                team: id.clone(),
                context: context.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Routing table
// ---------------------------------------------------------------------------

/// One row of the routing table: any of `systems` routes to all of `teams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub systems: Vec<String>,
    pub teams: Vec<TeamId>,
}

/// System tag (lower-case) to the teams responsible for it.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<String, BTreeSet<TeamId>>,
}

impl RoutingTable {
    pub fn new(entries: &[RouteEntry]) -> Self {
        let mut routes: BTreeMap<String, BTreeSet<TeamId>> = BTreeMap::new();
        for entry in entries {
            for system in &entry.systems {
                let key = system.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                routes
                    .entry(key)
                    .or_default()
                    .extend(entry.teams.iter().cloned());
            }
        }
        Self { routes }
    }

    pub fn lookup(&self, system: &str) -> Option<&BTreeSet<TeamId>> {
        self.routes.get(system)
    }

    /// Every team referenced anywhere in the table.
    pub fn referenced_teams(&self) -> impl Iterator<Item = &TeamId> {
        self.routes.values().flatten()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &BTreeSet<TeamId>)> {
        self.routes.iter()
    }
}

// ---------------------------------------------------------------------------
// Runbooks
// ---------------------------------------------------------------------------

/// Broad class of problem a runbook entry addresses.
///
/// Declaration order is the order in which categories are emitted for a
/// single system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    General,
    Availability,
    Performance,
    Security,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueCategory::General => "general",
            IssueCategory::Availability => "availability",
            IssueCategory::Performance => "performance",
            IssueCategory::Security => "security",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunbookEntry {
    pub system: String,
    #[serde(default = "default_category")]
    pub category: IssueCategory,
    pub steps: Vec<String>,
}

fn default_category() -> IssueCategory {
    IssueCategory::General
}

/// Runbook steps keyed by (system, category), plus the steps that open every
/// high-severity response.
#[derive(Debug, Clone, Default)]
pub struct RunbookCatalog {
    entries: BTreeMap<String, BTreeMap<IssueCategory, Vec<String>>>,
    immediate_steps: Vec<String>,
}

impl RunbookCatalog {
    pub fn new(entries: &[RunbookEntry], immediate_steps: Vec<String>) -> Self {
        let mut map: BTreeMap<String, BTreeMap<IssueCategory, Vec<String>>> = BTreeMap::new();
        for entry in entries {
            let system = entry.system.trim().to_lowercase();
            if system.is_empty() {
                continue;
            }
            map.entry(system)
                .or_default()
                .entry(entry.category)
                .or_default()
                .extend(entry.steps.iter().cloned());
        }
        Self {
            entries: map,
            immediate_steps,
        }
    }

    pub fn steps(&self, system: &str, category: IssueCategory) -> Option<&[String]> {
        self.entries
            .get(system)
            .and_then(|by_cat| by_cat.get(&category))
            .map(Vec::as_slice)
    }

    pub fn immediate_steps(&self) -> &[String] {
        &self.immediate_steps
    }
}

// ---------------------------------------------------------------------------
// Config form
// ---------------------------------------------------------------------------

/// Serializable catalog definition, as found in the `[catalog]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub teams: Vec<Team>,
    pub default_team: TeamId,
    pub oncall_team: TeamId,
    pub broader_channel: String,
    pub routes: Vec<RouteEntry>,
    pub runbooks: Vec<RunbookEntry>,
    pub immediate_steps: Vec<String>,
}

/// The validated, immutable catalogs built from a [`CatalogConfig`].
#[derive(Debug, Clone)]
pub struct Catalog {
    pub teams: TeamCatalog,
    pub routes: RoutingTable,
    pub runbooks: RunbookCatalog,
}

impl Catalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let teams = TeamCatalog::new(
            config.teams.clone(),
            config.default_team.clone(),
            config.oncall_team.clone(),
            config.broader_channel.clone(),
        )?;
        let routes = RoutingTable::new(&config.routes);
        for team in routes.referenced_teams() {
            teams.ensure_known(team, "routing table")?;
        }
        let runbooks = RunbookCatalog::new(&config.runbooks, config.immediate_steps.clone());
        Ok(Self {
            teams,
            routes,
            runbooks,
        })
    }

    /// The compiled-in catalog.
    pub fn builtin() -> Self {
        Self::from_config(&CatalogConfig::default()).expect("Embedded default catalog is invalid")
    }
}
