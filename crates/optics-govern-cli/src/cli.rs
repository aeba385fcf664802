use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "optics-govern",
    about = "Optics governance: check cross-domain invariants and plan the remediation batch",
    version
)]
pub struct Cli {
    /// Log filter directive (falls back to RUST_LOG, then `warn`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check every domain against its expected configuration
    Check {
        #[command(flatten)]
        source: SourceArgs,

        /// Acknowledged violation count, e.g. `UpgradeBeacon=4` (repeatable)
        #[arg(long = "expect", value_name = "TYPE=N")]
        expect: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check, gate, build the remediation batch, gate its shape, estimate gas
    Plan(PlanArgs),

    /// Plan, then execute against the snapshot chains and re-check
    Simulate(PlanArgs),
}

#[derive(Args)]
pub struct SourceArgs {
    /// Deploy configuration (TOML)
    #[arg(long)]
    pub config: String,

    /// Observed chain state snapshot (JSON)
    #[arg(long)]
    pub state: String,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Acknowledged violation count, e.g. `UpgradeBeacon=4` (repeatable)
    #[arg(long = "expect", value_name = "TYPE=N")]
    pub expect: Vec<String>,

    /// Also transfer every replica's ownership to its domain's governance router
    #[arg(long)]
    pub transfer_replica_ownership: bool,

    /// Expected number of calls on every domain
    #[arg(
        long,
        value_name = "N",
        required_unless_present = "expect_calls_per",
        conflicts_with = "expect_calls_per"
    )]
    pub expect_calls: Option<usize>,

    /// Expected number of calls on one domain, e.g. `1000=4` (repeatable)
    #[arg(long, value_name = "DOMAIN=N")]
    pub expect_calls_per: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
