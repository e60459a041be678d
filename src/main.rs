use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};

mod config;
mod console;
mod datetime;
mod issue;
mod jira;
mod sync_command;
mod time_entry;
mod toggl;

use config::ConfigFile;
use console::{ConsoleOperator, Operator};
use jira::{JiraClient, JiraCredentials};
use sync_command::{SyncCommand, SyncOutcome, SyncWindow};
use toggl::TogglClient;

/// Togglのtime entryをJiraのworklogに記録するCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- --start-date 2024-01-01 --end-date 2024-01-02
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long = "start-date",
        help = "The first date from which to collect time entries (YYYY-MM-DD)",
        parse(try_from_str = parse_date),
    )]
    start_date: Option<NaiveDate>,

    #[clap(
        long = "end-date",
        help = "The last date from which to collect time entries (YYYY-MM-DD)",
        parse(try_from_str = parse_date),
    )]
    end_date: Option<NaiveDate>,

    #[clap(long = "config", help = "Path to the config file")]
    config: Option<PathBuf>,

    #[clap(long = "toggl-token", env = "TOGGL_API_TOKEN", help = "Toggl API token")]
    toggl_token: Option<String>,

    #[clap(
        long = "server",
        env = "JIRA_SERVER",
        help = "Like https://<THIS VALUE>.atlassian.net/, or a full Jira URL"
    )]
    server: Option<String>,

    #[clap(long = "username", env = "JIRA_USERNAME", help = "Your Atlassian ID's username")]
    username: Option<String>,

    #[clap(
        long = "password",
        env = "JIRA_PASSWORD",
        hide_env_values = true,
        help = "Your Atlassian ID's password"
    )]
    password: Option<String>,

    #[clap(
        short = 'v',
        long = "verbose",
        parse(from_occurrences),
        help = "Increase logging verbosity"
    )]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose).context("Failed to set up logger")?;

    let config_file = ConfigFile::locate(args.config)?;
    info!("Using config file {}", config_file.path().display());
    let config = config_file.load()?;
    let operator = ConsoleOperator::new(io::stdin().lock(), io::stdout());
    let operator = if io::stdin().is_terminal() {
        operator.with_hidden_secrets()
    } else {
        operator
    };

    let toggl_token = resolve(args.toggl_token, config.toggl.token, || {
        operator.prompt("Toggl token")
    })?;
    let credentials = JiraCredentials {
        server: resolve(args.server, config.jira.server, || {
            operator.prompt("Jira server")
        })?,
        username: resolve(args.username, config.jira.username, || {
            operator.prompt("Atlassian ID username")
        })?,
        password: args.password.or(config.jira.password),
    };
    let window = SyncWindow {
        start_date: args.start_date,
        end_date: args.end_date,
    };

    let toggl_client = TogglClient::new(&toggl_token);
    let command = SyncCommand::new(&toggl_client, &config_file, &operator);
    match command
        .run(window, credentials, JiraClient::connect)
        .await?
    {
        SyncOutcome::NothingToSync => info!("Nothing to sync."),
        SyncOutcome::Aborted => {
            eprintln!("Aborted!");
            process::exit(1);
        }
        SyncOutcome::Synced { posted, cursor } => {
            println!("\nLogged {} entries. Next start date: {}", posted, cursor);
        }
    }

    Ok(())
}

/// 引数、設定ファイルの順に値を探し、どちらにもなければ入力を求める。
fn resolve<F>(arg: Option<String>, configured: Option<String>, prompt: F) -> Result<String>
where
    F: FnOnce() -> Result<String>,
{
    match arg.or(configured).filter(|value| !value.trim().is_empty()) {
        Some(value) => Ok(value),
        None => prompt(),
    }
}

/// 日付をパースする。
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Failed to parse date: {}", s))
}

/// ログの出力先を設定する。
///
/// レポートや入力と混ざらないよう標準エラーに出力する。
fn setup_logger(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()?;

    Ok(())
}
