//! Poll scheduling and the display seam
//!
//! [`Monitor`] owns every configured mailbox and polls each one when its
//! interval has elapsed. Results go to a [`StatusSink`]; new mail also
//! runs the mailbox's `notify` command and, if asked to, its fetcher.

use crate::config::{BiffConfig, MailboxConfig};
use crate::error::{Error, Result};
use crate::exec;
use crate::mailbox::MailboxDescriptor;
use crate::status::Classification;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Keyword for `notify` that rings the terminal bell instead of
/// running a command.
pub const BEEP: &str = "beep";

/// Receives every poll result.
pub trait StatusSink {
    fn update(&mut self, mailbox: &MailboxDescriptor, status: Classification);

    /// Ring the bell for a mailbox whose `notify` is `beep`.
    fn beep(&mut self) {}
}

/// Snapshot of one mailbox after a poll.
#[derive(Debug, Clone, Serialize)]
pub struct MailboxReport {
    pub label: String,
    pub kind: &'static str,
    pub total: i64,
    pub unread: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub classification: Classification,
    pub checked_at: DateTime<Utc>,
}

impl MailboxReport {
    #[must_use]
    pub fn new(mailbox: &MailboxDescriptor, classification: Classification) -> Self {
        let counts = mailbox.counts();
        Self {
            label: mailbox.label().to_string(),
            kind: mailbox.checker().kind(),
            total: counts.total,
            unread: counts.unread,
            status: mailbox.text_status().map(str::to_string),
            classification,
            checked_at: Utc::now(),
        }
    }
}

/// When to run a mailbox's fetch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Never,
    OnNewMail,
    Every(Duration),
}

impl FetchPolicy {
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Self::Never,
            s if s < 0 => Self::OnNewMail,
            s => Self::Every(Duration::from_secs(s.unsigned_abs())),
        }
    }
}

/// Per-mailbox scheduling and user commands.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub interval: Duration,
    pub notify: Option<String>,
    pub action: Option<String>,
    pub fetch_cmd: Option<String>,
    pub fetch: FetchPolicy,
}

impl Schedule {
    #[must_use]
    pub fn from_config(config: &MailboxConfig, global_interval: Duration) -> Self {
        let interval = if config.interval_secs == 0 {
            global_interval
        } else {
            Duration::from_secs(config.interval_secs)
        };
        Self {
            interval,
            notify: config.notify.clone(),
            action: config.action.clone(),
            fetch_cmd: config.fetch_cmd.clone(),
            fetch: FetchPolicy::from_secs(config.fetch_interval_secs),
        }
    }
}

struct Entry {
    mailbox: MailboxDescriptor,
    schedule: Schedule,
    next_check: Instant,
    next_fetch: Option<Instant>,
}

/// Polls a set of mailboxes one at a time.
pub struct Monitor {
    entries: Vec<Entry>,
}

impl Monitor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Resolve every mailbox of `config`.
    ///
    /// # Errors
    ///
    /// The first [`Error::Address`] met while resolving.
    pub fn from_config(config: &BiffConfig) -> Result<Self> {
        let global = Duration::from_secs(config.interval_secs.max(1));
        let mut monitor = Self::new();
        for mailbox in &config.mailboxes {
            let descriptor = MailboxDescriptor::from_config(mailbox)?;
            monitor.add(descriptor, Schedule::from_config(mailbox, global));
        }
        Ok(monitor)
    }

    pub fn add(&mut self, mailbox: MailboxDescriptor, schedule: Schedule) {
        let now = Instant::now();
        let next_fetch = match schedule.fetch {
            FetchPolicy::Every(period) => Some(now + period),
            _ => None,
        };
        self.entries.push(Entry {
            mailbox,
            schedule,
            next_check: now,
            next_fetch,
        });
    }

    pub fn mailboxes(&self) -> impl Iterator<Item = &MailboxDescriptor> {
        self.entries.iter().map(|e| &e.mailbox)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Poll every mailbox once, in order.
    pub async fn poll_all(&mut self, sink: &mut dyn StatusSink) -> Vec<MailboxReport> {
        let mut reports = Vec::with_capacity(self.entries.len());
        for entry in &mut self.entries {
            reports.push(poll_entry(entry, sink).await);
        }
        reports
    }

    /// Poll forever, each mailbox on its own interval.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when there is nothing to monitor.
    pub async fn run(&mut self, sink: &mut dyn StatusSink) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::Config("nothing to monitor".into()));
        }
        info!(mailboxes = self.entries.len(), "monitoring");

        loop {
            let now = Instant::now();
            for entry in &mut self.entries {
                if entry.next_check <= now {
                    poll_entry(entry, sink).await;
                    entry.next_check = Instant::now() + entry.schedule.interval;
                }
                if let (Some(due), FetchPolicy::Every(period)) =
                    (entry.next_fetch, entry.schedule.fetch)
                {
                    if due <= now {
                        run_fetch(entry);
                        entry.next_fetch = Some(Instant::now() + period);
                    }
                }
            }

            let wake = self
                .entries
                .iter()
                .flat_map(|e| std::iter::once(e.next_check).chain(e.next_fetch))
                .min()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(1));
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Run the `action` of the mailbox labelled `label`, or its fetch
    /// command when it has no action.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an unknown label or a mailbox with neither
    /// command, or [`Error::Command`] if the shell cannot be started.
    pub fn activate(&self, label: &str) -> Result<()> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.mailbox.label() == label)
            .ok_or_else(|| Error::Config(format!("no mailbox labelled '{label}'")))?;
        let command = entry
            .schedule
            .action
            .as_deref()
            .or(entry.schedule.fetch_cmd.as_deref())
            .ok_or_else(|| Error::Config(format!("mailbox '{label}' has no action")))?;
        exec::spawn_detached(command)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_entry(entry: &mut Entry, sink: &mut dyn StatusSink) -> MailboxReport {
    let status = entry.mailbox.poll().await;
    sink.update(&entry.mailbox, status);

    if status == Classification::ChangedNewMail {
        match entry.schedule.notify.as_deref() {
            Some(BEEP) => sink.beep(),
            Some(command) => spawn_logged(command, entry.mailbox.label()),
            None => {}
        }
        if entry.schedule.fetch == FetchPolicy::OnNewMail {
            run_fetch(entry);
        }
    }
    MailboxReport::new(&entry.mailbox, status)
}

fn run_fetch(entry: &Entry) {
    if let Some(command) = entry.schedule.fetch_cmd.as_deref() {
        spawn_logged(command, entry.mailbox.label());
    }
}

fn spawn_logged(command: &str, label: &str) {
    if let Err(e) = exec::spawn_detached(command) {
        warn!(mailbox = %label, "{e}");
    }
}
