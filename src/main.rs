use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use incidentmedic::config::{AppConfig, LogFormat, LoggingConfig};
use incidentmedic::triage::{IncidentReport, TriageDecision};

#[derive(Parser)]
#[command(
    name = "incidentmedic",
    about = "Incident triage and escalation for on-call teams",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $INCIDENTMEDIC_CONFIG, then /etc/incidentmedic/incidentmedic.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Triage an incident report (JSON) without opening an incident
    Triage {
        /// Report file, or "-" for stdin
        #[arg(long, short, default_value = "-")]
        file: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the response teams and their channels
    Catalog {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn read_report(path: &Path) -> Result<IncidentReport> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read report from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report file: {}", path.display()))?
    };
    serde_json::from_str(&content).context("report is not a valid incident report")
}

fn print_decision(decision: &TriageDecision) {
    let teams: Vec<_> = decision.assigned_teams.iter().map(|t| t.as_str()).collect();
    println!("\nIncident Triage");
    println!("{:<12} {}", "Incident:", decision.incident_id);
    println!("{:<12} {}", "Severity:", decision.severity.as_str().to_uppercase());
    println!(
        "{:<12} {}",
        "Escalate:",
        if decision.escalation_needed { "yes" } else { "no" }
    );
    println!("{:<12} {}", "Teams:", teams.join(", "));
    println!(
        "{:<12} {}{}",
        "Priority:",
        decision.priority_score,
        if decision.security_incident { " (security)" } else { "" }
    );
    if decision.suggested_actions.is_empty() {
        println!("{:<12} none", "Actions:");
    } else {
        println!("Actions:");
        for (n, action) in decision.suggested_actions.iter().enumerate() {
            println!("  {:>2}. {}", n + 1, action);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting incidentmedic");
            incidentmedic::serve(config).await?;
        }
        Commands::Triage { file, json } => {
            let engine = incidentmedic::desk::build_engine(&config)?;
            let report = read_report(&file)?;
            let decision = engine.triage(&report)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                print_decision(&decision);
            }
        }
        Commands::Catalog { json } => {
            let engine = incidentmedic::desk::build_engine(&config)?;
            let teams = engine.teams();
            if json {
                let listing: Vec<_> = teams.teams().collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("\nResponse Teams");
                println!("{:<16} | Channel", "Team");
                println!("{:-<16}-|-{:-<24}", "", "");
                for team in teams.teams() {
                    let mut name = team.id.to_string();
                    if team.id == *teams.default_team() {
                        name.push('*');
                    }
                    println!("{:<16} | {}", name, team.channel);
                }
                println!("\n* default team; on-call: {}", teams.oncall_team());
                println!("Escalations go to {}", teams.broader_channel());
            }
        }
    }

    Ok(())
}
