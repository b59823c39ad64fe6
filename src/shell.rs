//! Shell command checker (`shell:::command`)
//!
//! The command's first output line is either a count:
//!
//! ```text
//! 3 new      -> 3 unread
//! 12 old     -> 12 messages, none unread
//! 12         -> same as "old"
//! ```
//!
//! or a short alphanumeric word shown as-is (`busy`, `offline`), which
//! counts as one unread message when the line mentions `new`.

use crate::error::{Error, Result};
use crate::exec;
use crate::reply::leading_integer;
use crate::status::MailCounts;
use tracing::error;

/// Longest word accepted as a text status.
pub const MAX_TEXT_STATUS: usize = 9;

/// What one run of the command reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellReading {
    pub counts: MailCounts,
    pub text_status: Option<String>,
}

#[derive(Debug)]
pub struct ShellChecker {
    command: String,
    verbose: bool,
}

impl ShellChecker {
    #[must_use]
    pub fn new(command: impl Into<String>, verbose: bool) -> Self {
        Self {
            command: command.into(),
            verbose,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command and interpret its first line.
    ///
    /// # Errors
    ///
    /// [`Error::Command`] if the command cannot be run, prints nothing,
    /// or prints something that is neither a count nor a short word.
    pub async fn check(&self) -> Result<ShellReading> {
        let command = self.command.clone();
        let output = tokio::task::spawn_blocking(move || exec::run_command(&command))
            .await
            .map_err(|e| Error::Command(format!("'{}' did not finish: {e}", self.command)))??;

        let Some(line) = output.first_line else {
            return Err(Error::Command(format!("'{}' printed nothing", self.command)));
        };
        chatter!(self.verbose, "'{}' returned '{}'", self.command, line);

        parse_shell_output(&line).ok_or_else(|| {
            error!(
                "'{}' returned something other than an integer message count or short string",
                self.command
            );
            Error::Command(format!("unusable output from '{}': {line:?}", self.command))
        })
    }
}

/// Interpret one line of checker output.
#[must_use]
pub fn parse_shell_output(line: &str) -> Option<ShellReading> {
    let trimmed = line.trim_start();

    if let Some(count) = leading_integer(trimmed) {
        let count = count.max(0);
        let counts = if line.contains("new") {
            MailCounts::new(count, count)
        } else {
            MailCounts::new(count, 0)
        };
        return Some(ShellReading {
            counts,
            text_status: None,
        });
    }

    let word = trimmed.split_whitespace().next()?;
    let text: String = word
        .chars()
        .take(MAX_TEXT_STATUS)
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    if text.is_empty() {
        return None;
    }
    if text.len() < word.len().min(MAX_TEXT_STATUS) {
        error!("only alphanumeric strings are shown: '{word}' is not ok");
    }

    let unread = i64::from(line.contains("new"));
    Some(ShellReading {
        counts: MailCounts::new(unread, unread),
        text_status: Some(text),
    })
}
