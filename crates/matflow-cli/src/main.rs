//! `matflow` command line

mod cli;
mod commands;
mod logging;

use anyhow::{Context, Result};
use cli::FailSpec;
use commands::RunOptions;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    match real_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "matflow failed");
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main() -> Result<i32> {
    let matches = cli::command().get_matches();

    logging::setup_logging(
        matches.get_count("verbose"),
        matches.get_flag("quiet"),
        matches.get_one::<PathBuf>("log-file").map(PathBuf::as_path),
    )?;
    let config = commands::load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("plugins", _)) => {
            commands::plugins(&commands::registry(&config)?)?;
            Ok(0)
        }
        Some(("compose", args)) => {
            commands::compose(
                &commands::registry(&config)?,
                required_path(args, "structure")?,
                required_path(args, "parameters")?,
            )?;
            Ok(0)
        }
        Some(("run", args)) => {
            let options = RunOptions {
                structure: required_path(args, "structure")?.to_path_buf(),
                parameters: required_path(args, "parameters")?.to_path_buf(),
                snapshot_dir: args.get_one::<PathBuf>("snapshot-dir").cloned(),
                fail: args
                    .get_many::<FailSpec>("fail")
                    .map(|specs| specs.cloned().collect())
                    .unwrap_or_default(),
                hold: args
                    .get_many::<String>("hold")
                    .map(|branches| branches.cloned().collect())
                    .unwrap_or_default(),
                clean_workdir: args.get_flag("clean-workdir"),
            };
            commands::run(&commands::registry(&config)?, &config, options).await
        }
        Some(("resume", args)) => {
            let id = args.get_one::<String>("id").context("--id is required")?;
            commands::resume(
                &config,
                args.get_one::<PathBuf>("snapshot-dir").cloned(),
                id,
                args.get_flag("keep-held"),
            )
            .await
        }
        Some(("snapshots", args)) => {
            commands::snapshots(&config, args.get_one::<PathBuf>("snapshot-dir").cloned()).await?;
            Ok(0)
        }
        _ => Ok(0),
    }
}

fn required_path<'a>(args: &'a clap::ArgMatches, name: &str) -> Result<&'a std::path::Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("--{name} is required"))
}
