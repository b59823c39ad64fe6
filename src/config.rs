//! Mailbox configuration

use crate::error::{Error, Result};
use crate::exec;
use crate::transport::{ConnectOptions, DEFAULT_READ_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the config file looked up in `$HOME`.
pub const DEFAULT_FILE_NAME: &str = ".mailbiff.json";

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "MAILBIFF_CONFIG";

/// Seconds between polls when neither the file nor a mailbox says otherwise.
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// How much protocol chatter a mailbox logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// Only failures.
    #[default]
    Error,
    /// Greetings, commands and replies too.
    Info,
}

impl DebugLevel {
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Info)
    }
}

/// One `mailboxes` entry of the config file.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
    pub label: String,
    /// Scheme-prefixed address, e.g. `pop3:user pass host`.
    pub path: String,
    /// Poll interval; `0` uses the global one.
    #[serde(default)]
    pub interval_secs: u64,
    /// Command run on new mail, or `beep`.
    #[serde(default)]
    pub notify: Option<String>,
    /// Command run when the mailbox is activated.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub fetch_cmd: Option<String>,
    /// `-1` fetches on new mail, `0` never, `n > 0` every `n` seconds.
    #[serde(default)]
    pub fetch_interval_secs: i64,
    #[serde(default)]
    pub debug: DebugLevel,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl MailboxConfig {
    /// A mailbox with every optional field at its default.
    #[must_use]
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            interval_secs: 0,
            notify: None,
            action: None,
            fetch_cmd: None,
            fetch_interval_secs: 0,
            debug: DebugLevel::default(),
            read_timeout_secs: None,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            read_timeout: self
                .read_timeout_secs
                .map_or(DEFAULT_READ_TIMEOUT, Duration::from_secs),
            accept_invalid_certs: self.accept_invalid_certs,
            verbose: self.debug.is_verbose(),
        }
    }
}

impl fmt::Debug for MailboxConfig {
    // The path holds credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("label", &self.label)
            .field("interval_secs", &self.interval_secs)
            .field("fetch_interval_secs", &self.fetch_interval_secs)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// The whole config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiffConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    pub mailboxes: Vec<MailboxConfig>,
}

const fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl BiffConfig {
    /// Locate and load the configuration.
    ///
    /// Reads `.env` if present. The file is `explicit` if given, else
    /// `$MAILBIFF_CONFIG`, else `$HOME/.mailbiff.json`. When the default
    /// file does not exist, a single spool mailbox is derived from
    /// `$MAIL` or `/var/mail/$USER`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when a named file is missing or malformed, or
    /// no mailbox can be derived at all.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("no config file, falling back to the mail spool");
                Self::spool_fallback(env::var("MAIL").ok(), env::var("USER").ok())
            }
        }
    }

    /// Read and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        warn_if_exposed(path);
        Self::from_json(&text)
    }

    /// Parse a config document and expand backticks in mailbox paths.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] on malformed JSON, an empty mailbox list, an
    /// empty label or path, or a failing backtick command.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))?;

        if config.mailboxes.is_empty() {
            return Err(Error::Config("no mailboxes configured".into()));
        }
        for mailbox in &mut config.mailboxes {
            if mailbox.label.trim().is_empty() {
                return Err(Error::Config("mailbox with an empty label".into()));
            }
            if mailbox.path.contains('`') {
                mailbox.path = exec::expand_backticks(&mailbox.path)?;
            }
            if mailbox.path.trim().is_empty() {
                return Err(Error::Config(format!(
                    "mailbox '{}' has an empty path",
                    mailbox.label
                )));
            }
        }
        Ok(config)
    }

    /// The configuration used when there is no config file.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when neither `mail` nor `user` is known.
    pub fn spool_fallback(mail: Option<String>, user: Option<String>) -> Result<Self> {
        let path = match (mail, user) {
            (Some(mail), _) if !mail.is_empty() => mail,
            (_, Some(user)) if !user.is_empty() => format!("/var/mail/{user}"),
            _ => {
                return Err(Error::Config(
                    "no config file and neither MAIL nor USER is set".into(),
                ));
            }
        };
        Ok(Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            mailboxes: vec![MailboxConfig::new("Spool", path)],
        })
    }
}

fn default_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_FILE_NAME))
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                "{} holds passwords but is accessible by others (mode {:o}); consider chmod 600",
                path.display(),
                mode & 0o777
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}
