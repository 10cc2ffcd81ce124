//! shellkeep CLI
//!
//! Runs commands in one persistent shell session, interactively, one-shot,
//! or from the `<TOOL>` blocks of a model reply.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use shellkeep_cli::output::exit_status_byte;
use shellkeep_cli::repl::{self, ReplConfig};
use shellkeep_cli::{exec_cmd, tools_cmd};
use shellkeep_core::config::{Config, load_config};
use shellkeep_core::tracing_init::{default_filter, init_tracing};
use shellkeep_core::{SessionOptions, ShellSession};

#[derive(Parser, Debug)]
#[command(name = "shellkeep")]
#[command(version, about = "Persistent shell sessions for tool-using models", long_about = None)]
struct Cli {
    /// Working directory for the shell (defaults to the current directory)
    #[arg(short = 'd', long, global = true)]
    cwd: Option<PathBuf>,

    /// Shell executable (defaults to bash on PATH)
    #[arg(long, global = true, env = "SHELLKEEP_SHELL")]
    shell: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Value for LANG and LC_ALL inside the shell
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Log level for shellkeep crates (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print command results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read commands from stdin, one per line (default)
    Repl,
    /// Run commands in order and exit with the last one's status
    Exec {
        /// Commands to run
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Run the <TOOL> blocks of a model reply and print the feedback message
    Tools {
        /// File holding the reply (stdin when omitted)
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(shell) = &self.shell {
            config.session.shell = Some(shell.clone());
        }
        if let Some(secs) = self.timeout {
            config.session.timeout_secs = secs;
        }
        if let Some(locale) = &self.locale {
            config.session.locale.clone_from(locale);
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "shellkeep failed");
            let _ = writeln!(io::stderr(), "error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let cwd = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let mut config = load_config(Some(&cwd))?;
    cli.apply_overrides(&mut config);
    init_tracing(
        &default_filter(&config.logging.level),
        config.logging.json,
    );
    info!(version = env!("CARGO_PKG_VERSION"), "Starting shellkeep");

    let mut options: SessionOptions = config.session.to_options(&cwd);
    if cli.cwd.is_some() {
        options.working_directory = cwd;
    }
    let mut session = ShellSession::start(options).await?;
    info!(
        shell = %session.shell().display(),
        cwd = %session.working_directory().display(),
        "Session started"
    );

    let outcome = dispatch(&cli, &config, &mut session).await;
    session.close().await;
    outcome
}

async fn dispatch(cli: &Cli, config: &Config, session: &mut ShellSession) -> anyhow::Result<u8> {
    let mut out = io::stdout();
    let mut err = io::stderr();
    let command_timeout = cli.timeout.map(Duration::from_secs);

    match &cli.command {
        None | Some(Commands::Repl) => {
            let repl_config = ReplConfig {
                json: cli.json,
                resync_timeout: Duration::from_secs(config.session.startup_timeout_secs),
            };
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            repl::run(session, stdin, &mut out, &mut err, &repl_config).await?;
            Ok(0)
        }
        Some(Commands::Exec { commands }) => {
            let code =
                exec_cmd::run(session, commands, command_timeout, cli.json, &mut out, &mut err)
                    .await?;
            Ok(exit_status_byte(code))
        }
        Some(Commands::Tools { file }) => {
            let reply = match file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    tokio::io::stdin().read_to_string(&mut text).await?;
                    text
                }
            };
            let replay = tools_cmd::replay(session, &reply, command_timeout).await?;
            if replay.commands.is_empty() {
                writeln!(err, "[no <TOOL> blocks found]")?;
            }
            if let Some(feedback) = &replay.feedback {
                writeln!(out, "{feedback}")?;
            }
            Ok(exit_status_byte(replay.last_exit_code()))
        }
    }
}
