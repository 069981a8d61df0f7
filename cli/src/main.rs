//! `netaudit` command line entry point.
//!
//! Argument parsing, file I/O and output formatting only; all audit logic
//! lives in `netaudit-core`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use netaudit_core::session::{
    fetch_document, ConnectionInfo, RemoteSession, SessionOptions, TelnetSession,
};
use netaudit_core::{AuditRunner, ConfigDocument, RuleCatalog, RuleResult, VersionContext};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "netaudit",
    version,
    about = "Audit network device configurations against a rule catalog"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a rule group against a configuration file.
    Run {
        /// Rule file or directory of rule files. Repeat to layer catalogs.
        #[arg(long = "tests", required = true)]
        tests: Vec<PathBuf>,

        /// Configuration snapshot to audit.
        #[arg(long)]
        config: PathBuf,

        /// Version label of the device, least specific first. Repeatable.
        #[arg(long = "version-label")]
        version_labels: Vec<String>,

        /// Rule group to run.
        #[arg(long)]
        group: String,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List rule groups and their rules.
    Groups {
        #[arg(long = "tests", required = true)]
        tests: Vec<PathBuf>,
    },

    /// Show which definition a rule resolves to.
    Show {
        #[arg(long = "tests", required = true)]
        tests: Vec<PathBuf>,

        #[arg(long)]
        rule: String,

        #[arg(long = "version-label")]
        version_labels: Vec<String>,
    },

    /// Retrieve command output from a device over telnet.
    Fetch {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: Option<u16>,

        /// Sent when the device prompts for a username.
        #[arg(long, env = "NETAUDIT_USERNAME")]
        username: Option<String>,

        /// Sent when the device prompts for a password.
        #[arg(long, env = "NETAUDIT_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Command to send. Repeat to send several; the last one's output is kept.
        #[arg(long = "command", required = true)]
        commands: Vec<String>,

        /// Seconds to wait for each command's output.
        #[arg(long, default_value_t = 3)]
        wait: u64,

        /// Write the output here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    group: &'a str,
    versions: &'a [String],
    passed: usize,
    failed: usize,
    results: &'a [RuleResult],
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Commands::Run {
            tests,
            config,
            version_labels,
            group,
            format,
        } => cmd_run(&tests, &config, version_labels, &group, format),
        Commands::Groups { tests } => cmd_groups(&tests),
        Commands::Show {
            tests,
            rule,
            version_labels,
        } => cmd_show(&tests, &rule, version_labels),
        Commands::Fetch {
            host,
            port,
            username,
            password,
            commands,
            wait,
            output,
        } => {
            let mut connection = ConnectionInfo::new(host).with_credentials(username, password);
            if let Some(port) = port {
                connection = connection.with_port(port);
            }
            cmd_fetch(connection, &commands, wait, output.as_deref()).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "netaudit=debug,netaudit_core=debug"
    } else {
        "netaudit=info,netaudit_core=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_catalog(paths: &[PathBuf]) -> Result<RuleCatalog> {
    let mut catalog = RuleCatalog::new();
    for path in paths {
        if path.is_dir() {
            let count = catalog
                .load_dir(path)
                .with_context(|| format!("Failed to load rules from {}", path.display()))?;
            tracing::debug!(path = %path.display(), files = count, "loaded rule directory");
        } else {
            catalog
                .load_file(path)
                .with_context(|| format!("Failed to load rule file {}", path.display()))?;
        }
    }
    Ok(catalog)
}

fn cmd_run(
    tests: &[PathBuf],
    config: &Path,
    version_labels: Vec<String>,
    group: &str,
    format: Format,
) -> Result<ExitCode> {
    let catalog = load_catalog(tests)?;
    let document = ConfigDocument::load(config)
        .with_context(|| format!("Failed to read configuration {}", config.display()))?;

    let mut runner = AuditRunner::new(document, catalog).with_version(version_labels);
    let results = runner
        .run(Some(group))
        .with_context(|| format!("Audit of group '{}' failed", group))?
        .to_vec();

    let passed = results.iter().filter(|r| r.outcome).count();
    let failed = results.len() - passed;

    match format {
        Format::Text => {
            for result in &results {
                let status = if result.outcome { "OK" } else { "FAIL" };
                println!("{}: {}", result.name, status);
                if let Some(message) = &result.message {
                    for line in message.lines() {
                        println!("    {}", line);
                    }
                }
            }
            println!("\n{} passed, {} failed", passed, failed);
        }
        Format::Json => {
            let report = Report {
                group,
                versions: runner.version().labels(),
                passed,
                failed,
                results: &results,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    // 1 is left to anyhow for errors.
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn cmd_groups(tests: &[PathBuf]) -> Result<ExitCode> {
    let catalog = load_catalog(tests)?;
    for (name, rules) in catalog.groups() {
        println!("{}:", name);
        for rule in rules {
            println!("  - {}", rule);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(tests: &[PathBuf], rule: &str, version_labels: Vec<String>) -> Result<ExitCode> {
    let catalog = load_catalog(tests)?;
    let version = VersionContext::from(version_labels);
    let resolved = catalog
        .resolve(rule, &version)
        .with_context(|| format!("Could not resolve rule '{}'", rule))?;

    println!("rule:     {}", resolved.name);
    println!("version:  {}", resolved.version);
    println!("type:     {:?}", resolved.kind);
    if let Some(command) = &resolved.command {
        println!("command:  {}", command);
    }
    for (level, pattern) in resolved.pattern.sources().iter().enumerate() {
        println!("match[{}]: {}", level, pattern);
    }
    println!("expected: {}", resolved.expected);
    Ok(ExitCode::SUCCESS)
}

fn session_options(wait_secs: u64) -> SessionOptions {
    SessionOptions {
        command_timeout_ms: wait_secs.saturating_mul(1_000),
        ..SessionOptions::default()
    }
}

async fn cmd_fetch(
    connection: ConnectionInfo,
    commands: &[String],
    wait_secs: u64,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let wait = Duration::from_secs(wait_secs);
    let mut session = TelnetSession::new(connection, session_options(wait_secs));
    session
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", session.connection().hostname))?;

    let Some((last, setup)) = commands.split_last() else {
        anyhow::bail!("at least one --command is required");
    };
    for command in setup {
        session.send_command(command, Some(wait)).await?;
    }
    let document = fetch_document(&mut session, last, Some(wait))
        .await
        .with_context(|| format!("Command '{}' failed", last))?;

    match output {
        Some(path) => fs::write(path, document.contents())
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", document.contents()),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_sets_the_command_timeout() {
        assert_eq!(session_options(3).command_timeout(), Duration::from_secs(3));
        assert_eq!(session_options(3).default_port, 23);
    }

    #[test]
    fn huge_wait_saturates() {
        assert_eq!(session_options(u64::MAX).command_timeout_ms, u64::MAX);
    }

    #[test]
    fn fetch_credentials_come_from_flags() {
        let cli = Cli::parse_from([
            "netaudit",
            "fetch",
            "--host",
            "10.0.0.1",
            "--username",
            "admin",
            "--password",
            "secret",
            "--command",
            "show running-config",
        ]);
        let Commands::Fetch {
            username,
            password,
            commands,
            wait,
            ..
        } = cli.cmd
        else {
            panic!("expected the fetch subcommand");
        };
        assert_eq!(username.as_deref(), Some("admin"));
        assert_eq!(password.as_deref(), Some("secret"));
        assert_eq!(commands, vec!["show running-config".to_string()]);
        assert_eq!(wait, 3);
    }
}
