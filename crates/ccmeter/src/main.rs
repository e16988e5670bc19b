use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ccmeter::cli::commands;
use ccmeter::cli::OutputFormat;
use ccmeter::config::{Config, EngineSettings};
use ccmeter::pricing::PricingTable;
use ccmeter::remote::AnthropicProbe;
use ccmeter::summary::TodayCostStrategy;

const LONG_ABOUT: &str = r#"Token usage and cost meter for Claude Code.

Reads ~/.claude/stats-cache.json and ~/.claude.json, estimates spend per model
and project, and optionally reads remaining API quota from rate-limit headers.

QUICK START
═══════════════════════════════════════════════════════════════════════════════

  ccmeter                   # Today's and all-time usage
  ccmeter watch             # Live view, refreshed when Claude Code writes stats
  ccmeter quota             # Remaining API quota (needs ANTHROPIC_API_KEY)
  ccmeter -f json           # Output as JSON"#;

const AFTER_LONG_HELP: &str = r#"
TODAY'S COST
═══════════════════════════════════════════════════════════════════════════════

  output-tokens   Price the day's per-model output tokens (default)
  message-share   Scale all-time cost by the day's share of messages

PRICING FILE (--pricing), rates in USD per million tokens
═══════════════════════════════════════════════════════════════════════════════

  {"models": [{"model": "claude-sonnet-4-5", "input": 3, "output": 15,
               "cacheRead": 0.3, "cacheWrite": 3.75}],
   "fallback": {"input": 3, "output": 15, "cacheRead": 0.3, "cacheWrite": 3.75}}

OUTPUT FORMATS: -f table | json | jsonl | raw"#;

#[derive(Parser)]
#[command(name = "ccmeter")]
#[command(version)]
#[command(about = "Claude Code token usage and cost meter", long_about = LONG_ABOUT)]
#[command(after_long_help = AFTER_LONG_HELP)]
struct Cli {
    /// Path to Claude data directory (default: ~/.claude)
    #[arg(long, env = "CLAUDE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Path to the global Claude config (default: ~/.claude.json)
    #[arg(long, env = "CLAUDE_GLOBAL_CONFIG", global = true)]
    global_config: Option<PathBuf>,

    /// API key used to read remaining quota
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Seconds between quota polls (minimum 10)
    #[arg(long, env = "CCMETER_POLL_INTERVAL", default_value = "60", global = true)]
    poll_interval: u64,

    /// JSON file replacing the built-in pricing table
    #[arg(long, global = true)]
    pricing: Option<PathBuf>,

    /// How today's cost is estimated
    #[arg(long, value_enum, default_value = "output-tokens", global = true)]
    today_cost: TodayCostStrategy,

    /// Output format: table, json, jsonl, raw
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print today's and all-time usage once (default)
    Summary,

    /// Keep running and print a new summary whenever the data changes
    #[command(visible_alias = "w")]
    Watch,

    /// Probe the API once and print remaining quota
    Quota,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<EngineSettings> {
        let mut config = match &self.data_dir {
            Some(dir) => Config::from_data_dir(dir.clone())?,
            None => Config::default(),
        };
        if let Some(path) = &self.global_config {
            config = config.with_global_config_file(path.clone());
        }

        let mut settings = EngineSettings::new(config)
            .with_credential(self.api_key.clone())
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_today_cost(self.today_cost);

        if let Some(path) = &self.pricing {
            let table = PricingTable::from_file(path)
                .with_context(|| format!("Failed to load pricing table {}", path.display()))?;
            settings = settings.with_pricing(table);
        }

        Ok(settings)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ccmeter=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ccmeter=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.settings()?;

    match cli.command.unwrap_or(Commands::Summary) {
        Commands::Summary => commands::summary(&settings, cli.format).await?,
        Commands::Watch => {
            let probe = Arc::new(AnthropicProbe::new(settings.endpoint.clone())?);
            commands::watch(settings, probe, cli.format).await?;
        }
        Commands::Quota => commands::quota(&settings, cli.format).await?,
    }

    Ok(())
}
