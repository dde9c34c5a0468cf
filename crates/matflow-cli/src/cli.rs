//! Command-line definition

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Scripted branch failure, `BRANCH=STATUS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FailSpec {
    pub(crate) branch: String,
    pub(crate) exit_status: u32,
}

pub(crate) fn parse_fail_spec(text: &str) -> Result<FailSpec, String> {
    let (branch, status) = text
        .split_once('=')
        .ok_or_else(|| format!("expected BRANCH=STATUS, got `{text}`"))?;
    if branch.is_empty() {
        return Err("branch name is empty".to_string());
    }
    let exit_status = status
        .parse::<u32>()
        .map_err(|err| format!("invalid exit status `{status}`: {err}"))?;
    if exit_status == 0 {
        return Err("exit status 0 is a success".to_string());
    }
    Ok(FailSpec {
        branch: branch.to_string(),
        exit_status,
    })
}

fn structure_arg() -> Arg {
    Arg::new("structure")
        .long("structure")
        .short('s')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Structure JSON file")
}

fn parameters_arg() -> Arg {
    Arg::new("parameters")
        .long("parameters")
        .short('p')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Parameter document (.json, .yaml or .toml)")
}

fn snapshot_dir_arg() -> Arg {
    Arg::new("snapshot-dir")
        .long("snapshot-dir")
        .value_parser(value_parser!(PathBuf))
        .help("Directory for snapshots; overrides the config file")
}

fn clean_workdir_arg() -> Arg {
    Arg::new("clean-workdir")
        .long("clean-workdir")
        .action(ArgAction::SetTrue)
        .help("Release remote folders once the workflow terminates")
}

pub(crate) fn command() -> Command {
    Command::new("matflow")
        .version(matflow_core::VERSION)
        .about("Plugin-composable materials workflow orchestrator")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .after_help(
            "Exit status: 0 success, 1 error, 2 suspended. A failed branch exits with its \
             workflow code minus 391 (relax 401 -> 10, first plugin 405 -> 14), capped at 125.",
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .conflicts_with("verbose")
                .help("Silence all logging"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Also write logs to this file"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Orchestrator configuration (TOML)"),
        )
        .subcommand(Command::new("plugins").about("List registered plugins and their exit codes"))
        .subcommand(
            Command::new("compose")
                .about("Compose a workflow and print its label and input tree")
                .arg(structure_arg())
                .arg(parameters_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Run a workflow against the simulated substrate")
                .arg(structure_arg())
                .arg(parameters_arg())
                .arg(snapshot_dir_arg())
                .arg(
                    Arg::new("fail")
                        .long("fail")
                        .value_name("BRANCH=STATUS")
                        .action(ArgAction::Append)
                        .value_parser(parse_fail_spec)
                        .help("Make a branch finish with a non-zero exit status"),
                )
                .arg(
                    Arg::new("hold")
                        .long("hold")
                        .value_name("BRANCH")
                        .action(ArgAction::Append)
                        .help("Keep a branch running so the workflow suspends"),
                )
                .arg(clean_workdir_arg()),
        )
        .subcommand(
            Command::new("resume")
                .about("Resume a suspended workflow from its snapshot")
                .arg(snapshot_dir_arg())
                .arg(
                    Arg::new("id")
                        .long("id")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .help("Orchestrator id"),
                )
                .arg(
                    Arg::new("keep-held")
                        .long("keep-held")
                        .action(ArgAction::SetTrue)
                        .help("Do not release held branches before resuming"),
                ),
        )
        .subcommand(
            Command::new("snapshots")
                .about("List stored snapshots")
                .arg(snapshot_dir_arg()),
        )
}
