use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use autoshift::config::{Cli, Settings, ENV_KEYS};
use autoshift::database_ops::KeyDb;
use autoshift::runner::{schedule_interval, Session};
use autoshift::shift::ShiftClient;
use autoshift::summary::RunSummary;
use autoshift::util::env as env_util;
use autoshift::{notify, FIRST_RUN_NOTICE};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "autoshift failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    env_util::init_env();
    let cli = Cli::parse();
    let verbose = cli.verbose || env_util::env_flag("SHIFT_VERBOSE", false);
    autoshift::tracing::init_tracing(autoshift::tracing::default_filter(verbose))?;
    if verbose {
        debug!("Debug mode on");
    }

    let settings = Settings::resolve(cli, env_util::env_opt)?;
    env_util::preflight_check("autoshift", ENV_KEYS);

    if !settings.db_path.exists() {
        println!("{FIRST_RUN_NOTICE}");
    }

    let (user, password) = settings.credentials_or_prompt()?;
    let store = KeyDb::connect(&settings.db_path)
        .await
        .with_context(|| format!("opening {}", settings.db_path.display()))?
        .with_sources(settings.build_sources()?);
    let notifier = notify::from_config(
        settings.apprise_api.as_deref(),
        settings.apprise_url.as_deref(),
    )?;
    let mut session = Session {
        store: Box::new(store),
        client: Box::new(ShiftClient::new(user, password)?),
        notifier,
    };

    let opts = settings.redeem_options();
    let mut budget = settings.limit;
    let mut summary = RunSummary::default();
    let first = session.run_once(&opts, &mut budget, &mut summary).await;

    let Some(hours) = settings.schedule else {
        return Ok(match first {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        });
    };

    let every = schedule_interval(hours);
    info!(
        hours = every.as_secs_f64() / 3600.0,
        "Redeeming every {} hours",
        every.as_secs_f64() / 3600.0
    );
    println!("Press Ctrl+C to exit");
    session.run_scheduled(&opts, &mut budget, every).await?;
    info!("Goodbye.");
    Ok(ExitCode::SUCCESS)
}
