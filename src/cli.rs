//! Command-line surface.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::FlagValues;

#[derive(Debug, Parser)]
#[command(
    name = "lstn",
    version,
    about = "Analyze the behavior of your dependencies using listen.dev"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// config file (default is $HOME/.lstn.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// set the logging level
    #[arg(long, global = true, help_heading = "Config Flags")]
    pub loglevel: Option<String>,

    /// set the timeout, in seconds
    #[arg(long, global = true, help_heading = "Config Flags")]
    pub timeout: Option<u64>,

    /// the listen.dev endpoint emitting the NPM verdicts
    #[arg(long, global = true, help_heading = "Config Flags")]
    pub npm_endpoint: Option<String>,

    /// the listen.dev endpoint emitting the PyPi verdicts
    #[arg(long, global = true, help_heading = "Config Flags")]
    pub pypi_endpoint: Option<String>,

    /// output the options, then exit
    #[arg(long, global = true, help_heading = "Debug Flags")]
    pub debug_options: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct TokenArgs {
    /// set the GitHub token
    #[arg(long, help_heading = "Token Flags")]
    pub gh_token: Option<String>,

    /// set the listen.dev auth token
    #[arg(long, help_heading = "Token Flags")]
    pub jwt_token: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RegistryArgs {
    /// set a custom NPM registry
    #[arg(long, help_heading = "Registry Flags")]
    pub npm_registry: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GitHubArgs {
    /// set the GitHub owner name (org|user)
    #[arg(long, help_heading = "Reporting Flags")]
    pub gh_owner: Option<String>,

    /// set the GitHub repository name
    #[arg(long, help_heading = "Reporting Flags")]
    pub gh_repo: Option<String>,

    /// set the GitHub pull request ID
    #[arg(long, help_heading = "Reporting Flags")]
    pub gh_pull_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ReportingArgs {
    /// set one or more reporters to use
    #[arg(
        short = 'r',
        long,
        value_delimiter = ',',
        help_heading = "Reporting Flags",
        value_parser = PossibleValuesParser::new(["gh-pull-comment", "gh-pull-review", "gh-pull-check"])
    )]
    pub reporter: Option<Vec<String>>,

    #[command(flatten)]
    pub github: GitHubArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilteringArgs {
    /// list of packages to not process
    #[arg(long, value_delimiter = ',', help_heading = "Filtering Flags")]
    pub ignore_packages: Option<Vec<String>>,

    /// list of dependencies types to not process
    #[arg(
        long,
        value_delimiter = ',',
        help_heading = "Filtering Flags",
        value_parser = PossibleValuesParser::new(["dep", "dev", "optional", "peer", "bundle"])
    )]
    pub ignore_deptypes: Option<Vec<String>>,

    /// filter the output verdicts using a jsonpath script expression (server-side)
    #[arg(short = 's', long, help_heading = "Filtering Flags")]
    pub select: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct JsonArgs {
    /// output the verdicts (if any) in JSON form
    #[arg(long)]
    pub json: bool,

    /// filter the output using a jq expression (requires --json)
    #[arg(short = 'q', long, help_heading = "Filtering Flags")]
    pub jq: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect the verdicts for your dependencies tree
    In {
        #[command(flatten)]
        tokens: TokenArgs,
        #[command(flatten)]
        registry: RegistryArgs,
        #[command(flatten)]
        reporting: ReportingArgs,
        #[command(flatten)]
        json: JsonArgs,

        /// lockfiles to analyze
        #[arg(short = 'l', long, value_delimiter = ',')]
        lockfiles: Option<Vec<String>>,

        /// generate a lockfile on the fly
        #[arg(long)]
        genlock: bool,

        /// directory containing the lockfiles (default is the working directory)
        path: Option<String>,
    },
    /// Inspect the verdicts for your direct dependencies
    Scan {
        /// set the GitHub token
        #[arg(long, help_heading = "Token Flags")]
        gh_token: Option<String>,
        #[command(flatten)]
        registry: RegistryArgs,
        #[command(flatten)]
        reporting: ReportingArgs,
        #[command(flatten)]
        filtering: FilteringArgs,
        #[command(flatten)]
        json: JsonArgs,

        /// directory containing the package.json (default is the working directory)
        path: Option<String>,
    },
    /// Get the verdicts of a package
    #[command(after_help = "Examples:\n  lstn to chalk\n  lstn to debug 4.3.4\n  lstn to react \"^18.0.0\"")]
    To {
        #[command(flatten)]
        tokens: TokenArgs,
        #[command(flatten)]
        registry: RegistryArgs,
        #[command(flatten)]
        reporting: ReportingArgs,
        #[command(flatten)]
        filtering: FilteringArgs,
        #[command(flatten)]
        json: JsonArgs,

        /// <name> [<version>|<constraint>] [<shasum>]
        #[arg(value_name = "ARGS", num_args = 0..)]
        args: Vec<String>,
    },
    /// Run lstn in a CI environment
    Ci {
        #[command(subcommand)]
        command: CiCommands,
    },
    /// Print out version information
    Version {
        /// increase the verbosity (-v short, -vv long)
        #[arg(short = 'v', action = ArgAction::Count)]
        verbosity: u8,

        /// output the relevant changelog URL
        #[arg(long)]
        changelog: bool,
    },
    /// Details about the configuration file
    Config,
    /// Which environment variables you can use with lstn
    Environment,
    /// Details about the lstn exit codes
    Exit,
    /// A comprehensive reference of all the lstn commands
    Manual,
    /// A comprehensive guide to the reporters
    Reporters,
}

#[derive(Debug, Subcommand)]
pub enum CiCommands {
    /// Enable the CI eavesdropping
    Enable {
        #[command(flatten)]
        tokens: TokenArgs,

        /// the listen.dev Core API endpoint
        #[arg(long, help_heading = "Config Flags")]
        core_endpoint: Option<String>,

        /// directory containing the jibril executable (default is the PATH)
        #[arg(long)]
        dir: Option<String>,
    },
    /// Report the most critical findings into GitHub pull requests
    Report {
        #[command(flatten)]
        tokens: TokenArgs,

        /// the listen.dev Core API endpoint
        #[arg(long, help_heading = "Config Flags")]
        core_endpoint: Option<String>,

        #[command(flatten)]
        github: GitHubArgs,
    },
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Cli {
    /// The flags given on the command line, for the option resolver.
    pub fn flag_values(&self) -> FlagValues {
        let mut values = FlagValues {
            config: self.global.config.clone(),
            loglevel: self.global.loglevel.clone(),
            timeout: self.global.timeout,
            npm_endpoint: self.global.npm_endpoint.clone(),
            pypi_endpoint: self.global.pypi_endpoint.clone(),
            debug_options: flag(self.global.debug_options),
            ..FlagValues::default()
        };

        match &self.command {
            Commands::In {
                tokens,
                registry,
                reporting,
                json,
                lockfiles,
                genlock,
                ..
            } => {
                values.apply_tokens(tokens);
                values.npm_registry = registry.npm_registry.clone();
                values.apply_reporting(reporting);
                values.apply_json(json);
                values.lockfiles = lockfiles.clone();
                values.genlock = flag(*genlock);
            }
            Commands::Scan {
                gh_token,
                registry,
                reporting,
                filtering,
                json,
                ..
            } => {
                values.gh_token = gh_token.clone();
                values.npm_registry = registry.npm_registry.clone();
                values.apply_reporting(reporting);
                values.apply_filtering(filtering);
                values.apply_json(json);
            }
            Commands::To {
                tokens,
                registry,
                reporting,
                filtering,
                json,
                ..
            } => {
                values.apply_tokens(tokens);
                values.npm_registry = registry.npm_registry.clone();
                values.apply_reporting(reporting);
                values.apply_filtering(filtering);
                values.apply_json(json);
            }
            Commands::Ci {
                command:
                    CiCommands::Enable {
                        tokens,
                        core_endpoint,
                        dir,
                    },
            } => {
                values.apply_tokens(tokens);
                values.core_endpoint = core_endpoint.clone();
                values.dir = dir.clone();
            }
            Commands::Ci {
                command:
                    CiCommands::Report {
                        tokens,
                        core_endpoint,
                        github,
                    },
            } => {
                values.apply_tokens(tokens);
                values.core_endpoint = core_endpoint.clone();
                values.apply_github(github);
            }
            Commands::Version { .. }
            | Commands::Config
            | Commands::Environment
            | Commands::Exit
            | Commands::Manual
            | Commands::Reporters => {}
        }

        values
    }
}

impl FlagValues {
    fn apply_tokens(&mut self, tokens: &TokenArgs) {
        self.gh_token = tokens.gh_token.clone();
        self.jwt_token = tokens.jwt_token.clone();
    }

    fn apply_github(&mut self, github: &GitHubArgs) {
        self.gh_owner = github.gh_owner.clone();
        self.gh_repo = github.gh_repo.clone();
        self.gh_pull_id = github.gh_pull_id;
    }

    fn apply_reporting(&mut self, reporting: &ReportingArgs) {
        self.reporter = reporting.reporter.clone();
        self.apply_github(&reporting.github);
    }

    fn apply_filtering(&mut self, filtering: &FilteringArgs) {
        self.ignore_packages = filtering.ignore_packages.clone();
        self.ignore_deptypes = filtering.ignore_deptypes.clone();
        self.select = filtering.select.clone();
    }

    fn apply_json(&mut self, json: &JsonArgs) {
        self.json = flag(json.json);
        self.jq = json.jq.clone();
    }
}
