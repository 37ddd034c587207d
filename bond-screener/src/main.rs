//! Bond Screener - command line entry point.
//!
//! Results go to stdout, logs to stderr.

use bond_common::config::expand_path;
use bond_common::logging::init_logging;
use bond_common::{Config, Error, Result};
use bond_screener::data::authenticate;
use bond_screener::{IssClient, ReportFormat, ScreenerEngine, ScreenerReport};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Screen Moscow Exchange bonds against configured criteria.
#[derive(Parser, Debug)]
#[command(name = "bond-screener")]
#[command(version)]
#[command(about = "Fetch MOEX bond listings and filter them against configured criteria", long_about = None)]
struct Cli {
    /// Config file (default: ~/.bond-screener/config.json)
    #[arg(short, long, env = "BOND_CONFIG")]
    config: Option<String>,

    /// Trading mode: board group number or board id (repeatable, replaces configured modes)
    #[arg(short = 'm', long = "mode", value_name = "CODE")]
    modes: Vec<String>,

    /// Output format: table, markdown or json
    #[arg(short, long)]
    format: Option<String>,

    /// Attribute to sort results by
    #[arg(long, value_name = "FIELD")]
    sort_by: Option<String>,

    /// Sort ascending instead of descending
    #[arg(long)]
    ascending: bool,

    /// Print at most N bonds
    #[arg(short, long, value_name = "N")]
    limit: Option<usize>,

    /// Turn off configured enrichment (criteria on derived attributes still fetch what they need)
    #[arg(long)]
    no_enrich: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and criteria, then exit
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    /// Apply command line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if !self.modes.is_empty() {
            config.screener.modes = self.modes.clone();
        }
        if let Some(format) = &self.format {
            config.display.format = format.clone();
        }
        if let Some(sort_by) = &self.sort_by {
            config.display.sort_by = Some(sort_by.clone());
        }
        if self.ascending {
            config.display.descending = false;
        }
        if let Some(limit) = self.limit {
            config.display.limit = Some(limit);
        }
        if self.no_enrich {
            config.screener.enrich.trade_history = false;
            config.screener.enrich.coupons = false;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Screen failed");
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.as_deref().map(expand_path);
    let mut config = Config::load_with_env(path.as_deref())
        .map_err(|e| Error::Config(format!("{:#}", e)))?;
    cli.apply(&mut config);

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );
    info!("Bond Screener v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .map_err(|e| Error::Config(e.to_string()))?;
    let format: ReportFormat = config.display.format.parse().map_err(Error::Config)?;

    let client = IssClient::new(&config.iss)?;

    if cli.check_config {
        let engine = ScreenerEngine::new(&config, Arc::new(client))?;
        println!(
            "Configuration OK: {} trading mode(s), {} criteria",
            engine.modes().len(),
            engine.criteria().len()
        );
        for criterion in engine.criteria() {
            println!("  {}", criterion);
        }
        return Ok(());
    }

    let passport = match (&config.iss.user, &config.iss.password) {
        (Some(user), Some(password)) => {
            authenticate(client.http(), &config.iss.auth_url, user, password).await?
        }
        _ => None,
    };
    let client = client.with_passport(passport);

    let engine = ScreenerEngine::new(&config, Arc::new(client))?;
    let result = engine.run().await?;

    let report = ScreenerReport::new(&result, &config.display.columns);
    let output = report.generate(format);
    if output.ends_with('\n') {
        print!("{}", output);
    } else {
        println!("{}", output);
    }

    Ok(())
}
