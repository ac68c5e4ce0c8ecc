// src/cli/mod.rs — CLI definition (clap derive)

pub mod plan;
pub mod progress;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "layout-copilot",
    about = "Generate compliant retail store layouts with a plan/review loop",
    version
)]
pub struct Cli {
    /// Config file path (defaults to ~/.layout-copilot/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides [logging].level)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind host (overrides [api].host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides [api].port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate one layout and print it as JSON
    Plan(PlanArgs),
    /// List the cities the market table supports
    Cities,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Target city (must be in [market.supported_cities])
    #[arg(long)]
    pub city: String,

    /// Trend keyword; repeatable. Defaults to [market].default_keywords
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Store requirement passed to planner and reviewer; repeatable
    #[arg(short, long = "constraint")]
    pub constraints: Vec<String>,

    /// north, south, east or west
    #[arg(long)]
    pub entrance: Option<String>,

    #[arg(long)]
    pub store_name: Option<String>,

    /// Overrides [strategist].max_iterations
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Overrides [strategist].acceptance_threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Write the SVG diagram here
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the last draft when no plan is accepted
    #[arg(long)]
    pub allow_draft: bool,

    /// Print the audit log to stderr after the run
    #[arg(long)]
    pub audit: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}
