//! Mailbox descriptors and scheme dispatch
//!
//! An address's scheme prefix is resolved once, when the descriptor is
//! built, into a [`Checker`]. Every poll then runs that checker and
//! classifies the reading against the previous one.

use crate::address::ServerAddress;
use crate::config::{DebugLevel, MailboxConfig};
use crate::error::{Error, Result};
use crate::imap::{self, ImapChecker};
use crate::local::{MaildirChecker, MboxChecker};
use crate::pop3::{self, Pop3Checker};
use crate::shell::ShellChecker;
use crate::status::{Classification, MailCounts, classify};
use crate::transport::{self, ConnectOptions};
use std::fmt;
use tracing::warn;

/// One mailbox kind with its checker.
///
/// # Examples
///
/// ```
/// use mailbiff::{Checker, ConnectOptions};
///
/// let checker = Checker::resolve("MAILDIR:/home/me/Mail", &ConnectOptions::default()).unwrap();
/// assert_eq!(checker.kind(), "maildir");
///
/// let checker = Checker::resolve("/var/mail/me", &ConnectOptions::default()).unwrap();
/// assert_eq!(checker.kind(), "mbox");
/// ```
#[derive(Debug)]
pub enum Checker {
    Pop3(Pop3Checker),
    Imap(ImapChecker),
    Maildir(MaildirChecker),
    Mbox(MboxChecker),
    Shell(ShellChecker),
}

type Build = fn(&str, &ConnectOptions) -> Result<Checker>;

/// Recognised prefixes, matched case-insensitively in order.
const SCHEMES: &[(&str, Build)] = &[
    ("pop3:", build_pop3),
    ("pop3s:", build_pop3s),
    ("imap:", build_imap),
    ("imaps:", build_imaps),
    ("sslimap:", build_imaps),
    ("maildir:", build_maildir),
    ("mbox:", build_mbox),
    ("shell:", build_shell),
];

fn build_pop3(rest: &str, options: &ConnectOptions) -> Result<Checker> {
    let address = ServerAddress::parse(rest, pop3::DEFAULT_PORT, false)?;
    Ok(Checker::Pop3(Pop3Checker::new(address, false, options.clone())))
}

fn build_pop3s(rest: &str, options: &ConnectOptions) -> Result<Checker> {
    let address = ServerAddress::parse(rest, pop3::DEFAULT_TLS_PORT, false)?;
    transport::validate_server_name(&address.host)?;
    Ok(Checker::Pop3(Pop3Checker::new(address, true, options.clone())))
}

fn build_imap(rest: &str, options: &ConnectOptions) -> Result<Checker> {
    let address = ServerAddress::parse(rest, imap::DEFAULT_PORT, true)?;
    Ok(Checker::Imap(ImapChecker::new(address, false, options.clone())))
}

fn build_imaps(rest: &str, options: &ConnectOptions) -> Result<Checker> {
    let address = ServerAddress::parse(rest, imap::DEFAULT_TLS_PORT, true)?;
    transport::validate_server_name(&address.host)?;
    Ok(Checker::Imap(ImapChecker::new(address, true, options.clone())))
}

fn build_maildir(rest: &str, _: &ConnectOptions) -> Result<Checker> {
    Ok(Checker::Maildir(MaildirChecker::new(rest.trim())))
}

fn build_mbox(rest: &str, _: &ConnectOptions) -> Result<Checker> {
    Ok(Checker::Mbox(MboxChecker::new(rest.trim())))
}

fn build_shell(rest: &str, options: &ConnectOptions) -> Result<Checker> {
    // shell:<reserved>:<reserved>:command
    let mut fields = rest.splitn(3, ':');
    let (Some(_), Some(_), Some(command)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::Address(format!(
            "expected 'shell:::command', got 'shell:{rest}'"
        )));
    };
    Ok(Checker::Shell(ShellChecker::new(command, options.verbose)))
}

fn strip_prefix_ignore_case<'a>(address: &'a str, prefix: &str) -> Option<&'a str> {
    address
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &address[prefix.len()..])
}

impl Checker {
    /// Pick the checker for `address`; unknown prefixes are spool files.
    ///
    /// # Errors
    ///
    /// [`Error::Address`] when a network or shell address is malformed,
    /// or a TLS host is not a valid server name.
    pub fn resolve(address: &str, options: &ConnectOptions) -> Result<Self> {
        for (prefix, build) in SCHEMES {
            if let Some(rest) = strip_prefix_ignore_case(address, prefix) {
                return build(rest, options);
            }
        }
        build_mbox(address, options)
    }

    /// Short kind name, with `s` appended for TLS variants.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pop3(c) if c.uses_tls() => "pop3s",
            Self::Pop3(_) => "pop3",
            Self::Imap(c) if c.uses_tls() => "imaps",
            Self::Imap(_) => "imap",
            Self::Maildir(_) => "maildir",
            Self::Mbox(_) => "mbox",
            Self::Shell(_) => "shell",
        }
    }

    /// Where the checker looks, without any secret.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::Pop3(c) => c.address().account(),
            Self::Imap(c) => format!("{}/{}", c.address().account(), c.mailbox()),
            Self::Maildir(c) => c.path().display().to_string(),
            Self::Mbox(c) => c.path().display().to_string(),
            Self::Shell(c) => c.command().to_string(),
        }
    }

    /// `true` once a network checker has given up after a failed handshake.
    #[must_use]
    pub const fn is_blacklisted(&self) -> bool {
        match self {
            Self::Pop3(c) => c.is_blacklisted(),
            Self::Imap(c) => c.is_blacklisted(),
            _ => false,
        }
    }

    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Whatever the underlying checker reports.
    pub async fn check(&mut self) -> Result<Reading> {
        match self {
            Self::Pop3(c) => c.check().await.map(Reading::from_counts),
            Self::Imap(c) => c.check().await.map(Reading::from_counts),
            Self::Maildir(c) => c.check().await.map(Reading::from_counts),
            Self::Mbox(c) => c.check().await.map(Reading::from_counts),
            Self::Shell(c) => c.check().await.map(|r| Reading {
                counts: r.counts,
                text_status: r.text_status,
            }),
        }
    }

    const fn forget(&mut self) {
        match self {
            Self::Maildir(c) => c.forget(),
            Self::Mbox(c) => c.forget(),
            _ => {}
        }
    }
}

/// One successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub counts: MailCounts,
    pub text_status: Option<String>,
}

impl Reading {
    const fn from_counts(counts: MailCounts) -> Self {
        Self {
            counts,
            text_status: None,
        }
    }
}

/// A monitored mailbox and its last two readings.
pub struct MailboxDescriptor {
    label: String,
    checker: Checker,
    counts: MailCounts,
    previous: MailCounts,
    text_status: Option<String>,
    debug: DebugLevel,
}

impl MailboxDescriptor {
    /// A descriptor that has never been checked.
    #[must_use]
    pub fn new(label: impl Into<String>, checker: Checker, debug: DebugLevel) -> Self {
        Self {
            label: label.into(),
            checker,
            counts: MailCounts::UNKNOWN,
            previous: MailCounts::UNKNOWN,
            text_status: None,
            debug,
        }
    }

    /// Resolve a config entry.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Address`] when the address is malformed.
    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        let checker = Checker::resolve(&config.path, &config.connect_options())?;
        Ok(Self::new(config.label.clone(), checker, config.debug))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn checker(&self) -> &Checker {
        &self.checker
    }

    #[must_use]
    pub const fn counts(&self) -> MailCounts {
        self.counts
    }

    #[must_use]
    pub const fn previous(&self) -> MailCounts {
        self.previous
    }

    /// Word reported by a shell checker instead of counts.
    #[must_use]
    pub fn text_status(&self) -> Option<&str> {
        self.text_status.as_deref()
    }

    #[must_use]
    pub const fn debug(&self) -> DebugLevel {
        self.debug
    }

    /// Check the mailbox and classify the result.
    ///
    /// Failures are logged and reset both readings to
    /// [`MailCounts::UNKNOWN`], so the next success is always a change.
    pub async fn poll(&mut self) -> Classification {
        if !self.counts.is_known() {
            self.checker.forget();
        }

        match self.checker.check().await {
            Ok(reading) => {
                let classification = classify(self.counts, reading.counts);
                self.previous = self.counts;
                self.counts = reading.counts;
                self.text_status = reading.text_status;
                chatter!(
                    self.debug.is_verbose(),
                    mailbox = %self.label,
                    total = self.counts.total,
                    unread = self.counts.unread,
                    "{classification}"
                );
                classification
            }
            Err(e) => {
                warn!(mailbox = %self.label, "check failed: {e}");
                self.counts = MailCounts::UNKNOWN;
                self.previous = MailCounts::UNKNOWN;
                self.text_status = None;
                Classification::Error
            }
        }
    }
}

impl fmt::Debug for MailboxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxDescriptor")
            .field("label", &self.label)
            .field("kind", &self.checker.kind())
            .field("target", &self.checker.target())
            .field("counts", &self.counts)
            .field("previous", &self.previous)
            .field("text_status", &self.text_status)
            .finish_non_exhaustive()
    }
}
