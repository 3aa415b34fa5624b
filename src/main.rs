use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use cms_dl::{Config, Downloader, Result, RunLogger, RunSummary, SkipSignal, load_catalog};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("cms-dl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download every dataset listed in a CMS catalog CSV")
        .arg(
            Arg::new("catalog")
                .value_name("CATALOG")
                .value_parser(value_parser!(PathBuf))
                .help("Catalog CSV to read (default: cms_datasets.csv)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for dataset CSV files"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for run logs"),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Rows requested per page"),
        )
        .arg(
            Arg::new("skip-existing")
                .long("skip-existing")
                .action(ArgAction::SetTrue)
                .help("Skip datasets an earlier run already downloaded completely"),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(path) = matches.get_one::<PathBuf>("catalog") {
        config.catalog_path = path.clone();
    }
    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = matches.get_one::<PathBuf>("log-dir") {
        config.log_dir = dir.clone();
    }
    if let Some(size) = matches.get_one::<u64>("page-size") {
        config.fetch.page_size = *size;
    }
    if matches.get_flag("skip-existing") {
        config.skip_existing = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run(matches: &ArgMatches) -> Result<RunSummary> {
    let config = load_config(matches)?;
    let datasets = load_catalog(&config.catalog_path)?;
    let mut logger = RunLogger::create(&config.log_dir)?;

    let skip = SkipSignal::new();
    let cancel = CancellationToken::new();

    match cms_dl::spawn_skip_listener(std::io::BufReader::new(std::io::stdin()), skip.clone()) {
        Ok(_) => tracing::info!("Type 's' or 'skip' and press Enter to skip the current dataset"),
        Err(e) => tracing::warn!(error = %e, "Could not start skip listener"),
    }
    tokio::spawn(cms_dl::cancel_on_signal(cancel.clone()));

    let downloader = Downloader::from_config(config, skip, cancel)?;
    let summary = downloader.run(&datasets, &mut logger).await;
    logger.close()?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    match run(&matches).await {
        Ok(summary) => {
            println!(
                "Download summary: {} datasets, {} succeeded, {} failed, {} skipped, {} rows{}",
                summary.total,
                summary.succeeded,
                summary.failed,
                summary.skipped,
                summary.rows,
                if summary.interrupted { " (interrupted)" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Fatal error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
