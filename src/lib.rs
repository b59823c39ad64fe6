//! Mailbox count monitor
//!
//! Polls POP3, IMAP, maildir, mbox and shell-command mailboxes and
//! reports total and unread message counts, classifying every poll as
//! unchanged, changed, or carrying new mail.
//!
//! Network mailboxes speak through a [`Connection`], which hides
//! whether the stream is plain TCP or TLS behind a line-oriented
//! interface with a per-read timeout. POP3 sessions authenticate with
//! CRAM-MD5, APOP or USER/PASS, in that order, limited by an optional
//! per-mailbox allow-list.
//!
//! ```no_run
//! use mailbiff::{BiffConfig, Monitor, MailboxDescriptor, Classification, StatusSink};
//!
//! struct Print;
//!
//! impl StatusSink for Print {
//!     fn update(&mut self, mailbox: &MailboxDescriptor, status: Classification) {
//!         println!("{}: {} ({status})", mailbox.label(), mailbox.counts().unread);
//!     }
//! }
//!
//! # async fn demo() -> mailbiff::Result<()> {
//! let config = BiffConfig::load(None)?;
//! let mut monitor = Monitor::from_config(&config)?;
//! monitor.poll_all(&mut Print).await;
//! # Ok(())
//! # }
//! ```

/// Log protocol chatter at `info` for verbose mailboxes, `trace` otherwise.
macro_rules! chatter {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::trace!($($arg)+)
        }
    };
}

mod address;
mod auth;
mod config;
mod error;
pub mod exec;
mod imap;
mod line_buffer;
mod local;
mod mailbox;
mod monitor;
mod pop3;
mod reply;
mod shell;
mod status;
mod transport;

pub use address::ServerAddress;
pub use auth::{Attempt, AuthList, AuthMethod, Credentials, apop_digest, cram_md5_response, negotiate};
pub use config::{BiffConfig, DebugLevel, MailboxConfig};
pub use error::{Error, Result};
pub use imap::ImapChecker;
pub use line_buffer::{LineBuffer, MAX_LINE_LEN};
pub use local::{MaildirChecker, MboxChecker};
pub use mailbox::{Checker, MailboxDescriptor, Reading};
pub use monitor::{BEEP, FetchPolicy, MailboxReport, Monitor, Schedule, StatusSink};
pub use pop3::Pop3Checker;
pub use reply::{ServerReply, apop_challenge};
pub use shell::{ShellChecker, ShellReading, parse_shell_output};
pub use status::{Classification, MailCounts, classify};
pub use transport::{ConnectOptions, Connection, DEFAULT_READ_TIMEOUT};
