#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for checking mailbox counts

use clap::{Parser, Subcommand};
use mailbiff::{
    BiffConfig, Classification, MailboxDescriptor, MailboxReport, Monitor, StatusSink,
};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailbiff")]
#[command(about = "Report new and unread mail in POP3, IMAP, maildir, mbox and shell mailboxes")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: $MAILBIFF_CONFIG or ~/.mailbiff.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log protocol chatter
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every mailbox once
    Check,

    /// Poll continuously, printing every change
    Watch,

    /// List configured mailboxes
    Mailboxes,

    /// Run a mailbox's action (or fetch command)
    Action {
        /// Mailbox label
        label: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(&args))
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = BiffConfig::load(args.config.as_deref())?;
    let mut monitor = Monitor::from_config(&config)?;

    match &args.command {
        Command::Check => cmd_check(&mut monitor, args).await?,
        Command::Watch => cmd_watch(&mut monitor, args).await?,
        Command::Mailboxes => cmd_mailboxes(&monitor, args)?,
        Command::Action { label } => monitor.activate(label)?,
    }

    Ok(())
}

async fn cmd_check(monitor: &mut Monitor, args: &Args) -> anyhow::Result<()> {
    let reports = monitor.poll_all(&mut Quiet).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_report_table(&reports);
    }

    if reports
        .iter()
        .all(|r| r.classification == Classification::Error)
    {
        anyhow::bail!("every mailbox check failed");
    }
    Ok(())
}

async fn cmd_watch(monitor: &mut Monitor, args: &Args) -> anyhow::Result<()> {
    let mut printer = Printer { json: args.json };
    monitor.run(&mut printer).await?;
    Ok(())
}

fn cmd_mailboxes(monitor: &Monitor, args: &Args) -> anyhow::Result<()> {
    if args.json {
        let list: Vec<_> = monitor
            .mailboxes()
            .map(|m| {
                serde_json::json!({
                    "label": m.label(),
                    "kind": m.checker().kind(),
                    "target": m.checker().target(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        println!("{:<16} {:<8} {}", "Label", "Kind", "Target");
        println!("{}", "-".repeat(60));
        for m in monitor.mailboxes() {
            println!(
                "{:<16} {:<8} {}",
                truncate(m.label(), 15),
                m.checker().kind(),
                m.checker().target()
            );
        }
    }
    Ok(())
}

/// Sink for one-shot checks; results are printed afterwards.
struct Quiet;

impl StatusSink for Quiet {
    fn update(&mut self, _: &MailboxDescriptor, _: Classification) {}
}

/// Sink for `watch`: one line per change.
struct Printer {
    json: bool,
}

impl StatusSink for Printer {
    fn update(&mut self, mailbox: &MailboxDescriptor, status: Classification) {
        if status == Classification::Unchanged {
            return;
        }
        let report = MailboxReport::new(mailbox, status);
        if self.json {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("cannot encode report: {e}"),
            }
        } else {
            println!(
                "{} {:<16} {:>5} {:>5}  {}",
                report.checked_at.format("%H:%M:%S"),
                truncate(&report.label, 15),
                display_count(report.unread),
                display_count(report.total),
                report.status.as_deref().unwrap_or(status.as_str()),
            );
        }
    }

    fn beep(&mut self) {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }
}

fn print_report_table(reports: &[MailboxReport]) {
    if reports.is_empty() {
        println!("No mailboxes configured.");
        return;
    }

    println!("{:<16} {:<8} {:>6} {:>6}  {}", "Label", "Kind", "Unread", "Total", "Status");
    println!("{}", "-".repeat(60));

    for r in reports {
        println!(
            "{:<16} {:<8} {:>6} {:>6}  {}",
            truncate(&r.label, 15),
            r.kind,
            display_count(r.unread),
            display_count(r.total),
            r.status.as_deref().unwrap_or(r.classification.as_str()),
        );
    }
}

fn display_count(n: i64) -> String {
    if n < 0 { "?".to_string() } else { n.to_string() }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
