//! Help topics: `lstn config`, `environment`, `exit`, `manual`, and `reporters`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use clap::{Command, CommandFactory};

use crate::cli::Cli;
use crate::config::{
    DEFAULT_CORE_ENDPOINT, DEFAULT_LOGLEVEL, DEFAULT_NPM_ENDPOINT, DEFAULT_PYPI_ENDPOINT,
    DEFAULT_TIMEOUT, ReporterKind, env_name,
};
use crate::error::{AUTH_EXIT_CODE, CANCELLED_EXIT_CODE, DEFAULT_HALT_EXIT_CODE};

/// Flags that only make sense on the command line.
const COMMAND_LINE_ONLY: [&str; 4] = ["config", "debug-options", "help", "version"];

pub fn config() -> String {
    let mut out = String::from("# lstn configuration file\n\n");
    out.push_str("The `lstn` CLI looks for a configuration file when it starts, in this order:\n\n");
    for path in [
        "./.listendev.yaml",
        "./.listendev.yml",
        "./.listendev/config.yaml",
        "./.listendev/config.yml",
        "$HOME/.lstn.yaml",
    ] {
        let _ = writeln!(out, "* `{path}`");
    }
    out.push_str("\nThe `--config` flag selects a file explicitly.\n");
    out.push_str(
        "Environment variables and flags override the values in your configuration file.\n\n",
    );
    out.push_str("Here's an example of a configuration file (with the default values):\n\n");
    let _ = write!(
        out,
        "```yaml\nloglevel: {DEFAULT_LOGLEVEL}\ntimeout: {DEFAULT_TIMEOUT}\nendpoint:\n  npm: {DEFAULT_NPM_ENDPOINT}\n  pypi: {DEFAULT_PYPI_ENDPOINT}\n  core: {DEFAULT_CORE_ENDPOINT}\n```\n"
    );
    out
}

/// Long flag name to its help line, across every subcommand.
fn flag_docs(command: &Command, into: &mut BTreeMap<String, String>) {
    for arg in command.get_arguments() {
        let Some(long) = arg.get_long() else {
            continue;
        };
        if COMMAND_LINE_ONLY.contains(&long) {
            continue;
        }
        let help = arg.get_help().map(ToString::to_string).unwrap_or_default();
        into.entry(long.to_string()).or_insert(help);
    }
    for subcommand in command.get_subcommands() {
        flag_docs(subcommand, into);
    }
}

pub fn environment() -> String {
    let mut out = String::from("# lstn environment variables\n\n");
    out.push_str("The environment variables override any corresponding configuration setting.\n\n");
    out.push_str("But flags override them.\n\n");

    let mut docs = BTreeMap::new();
    flag_docs(&Cli::command(), &mut docs);
    for (flag, help) in docs {
        let _ = writeln!(out, "`{}`: {help}\n", env_name(&flag));
    }
    out
}

pub fn exit() -> String {
    format!(
        "The lstn CLI follows the usual conventions regarding exit codes.\n\n\
         Meaning:\n\n\
         * when a command completes successfully, the exit code will be 0\n\n\
         * when a command fails for any reason, the exit code will be 1\n\n\
         * when a command is running but gets cancelled, the exit code will be {CANCELLED_EXIT_CODE}\n\n\
         * when a command meets an authentication issue, the exit code will be {AUTH_EXIT_CODE}\n\n\
         * when a `--jq` expression halts, the exit code will be the one it asks for ({DEFAULT_HALT_EXIT_CODE} by default)\n\n\
         Notice that a particular command may have more exit codes,\n\
         so check the docs for the specific command if you rely on them.\n"
    )
}

fn reference(out: &mut String, command: &mut Command, depth: usize) {
    let name = command.get_bin_name().unwrap_or(command.get_name()).to_string();
    let _ = writeln!(out, "{} `{name}`\n", "#".repeat(depth));
    let _ = writeln!(out, "```\n{}\n```\n", command.render_help().to_string().trim_end());
    for subcommand in command.get_subcommands_mut() {
        if subcommand.get_name() == "help" {
            continue;
        }
        reference(out, subcommand, depth + 1);
    }
}

/// Every command with its flags. `lstn <command> --help` shows a single one.
pub fn manual() -> String {
    let mut out = String::from("# lstn cheatsheet\n\n");
    let mut root = Cli::command().bin_name("lstn");
    root.build();
    for subcommand in root.get_subcommands_mut() {
        if subcommand.get_name() == "help" {
            continue;
        }
        reference(&mut out, subcommand, 2);
    }
    out
}

fn reporter_doc(kind: ReporterKind) -> &'static str {
    match kind {
        ReporterKind::GhPullComment => {
            "It reports results as a sticky comment on the target GitHub pull request.\n\n\
             The target GitHub pull request comes from the values of the GitHub reporter flags \
             (ie., `--gh-repo`, `--gh-owner`, `--gh-pull-id`).\n\
             Notice those values are automatically set when `lstn` detects it is running in a GitHub Action.\n\n\
             ### Status\n\nWorking.\n"
        }
        ReporterKind::GhPullReview => {
            "It reports results to GitHub review & suggestion comments on the target GitHub pull request.\n\n\
             ### Status\n\nTBD.\n"
        }
        ReporterKind::GhPullCheck => {
            "It reports results to the GitHub pull requests check tab.\n\n\
             ### Limitations\n\n\
             When `lstn` detects it is running from a fork repository, the token GitHub hands out is read-only, \
             so this reporter writes the verdicts to the GitHub Actions **log console**.\n\n\
             ### Status\n\nTBD.\n"
        }
    }
}

pub fn reporters() -> String {
    let mut out = String::from("# lstn reporters\n\n");
    for kind in ReporterKind::ALL {
        let _ = writeln!(out, "## {}\n\n{}", kind.id(), reporter_doc(kind));
    }
    out
}
