//! IMAP message-count checker
//!
//! Shared by the `imap:`, `imaps:` and `sslimap:` schemes. Only the
//! commands needed for counts are spoken:
//!
//! ```text
//! a001 LOGIN user pass
//! a002 STATUS mailbox (MESSAGES UNSEEN)
//! a003 LOGOUT
//! ```

use crate::address::ServerAddress;
use crate::error::{Error, Result};
use crate::status::MailCounts;
use crate::transport::{ConnectOptions, Connection};
use tracing::{error, warn};

pub const DEFAULT_PORT: u16 = 143;
pub const DEFAULT_TLS_PORT: u16 = 993;
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Polls one IMAP folder.
#[derive(Debug)]
pub struct ImapChecker {
    address: ServerAddress,
    tls: bool,
    options: ConnectOptions,
    blacklisted: bool,
}

impl ImapChecker {
    #[must_use]
    pub const fn new(address: ServerAddress, tls: bool, options: ConnectOptions) -> Self {
        Self {
            address,
            tls,
            options,
            blacklisted: false,
        }
    }

    #[must_use]
    pub const fn address(&self) -> &ServerAddress {
        &self.address
    }

    #[must_use]
    pub const fn uses_tls(&self) -> bool {
        self.tls
    }

    #[must_use]
    pub const fn is_blacklisted(&self) -> bool {
        self.blacklisted
    }

    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.address.mailbox.as_deref().unwrap_or(DEFAULT_MAILBOX)
    }

    /// Log in, ask for the folder status, log out.
    ///
    /// # Errors
    ///
    /// Any connect, handshake, login, protocol or transport failure.
    pub async fn check(&mut self) -> Result<MailCounts> {
        let mut conn = self.connect().await?;

        let result = self.session(&mut conn).await;
        if !conn.is_blacklisted() {
            let _ = conn.send("a003 LOGOUT").await;
        }
        conn.close().await;
        result
    }

    fn name(&self) -> String {
        let scheme = if self.tls { "imaps" } else { "imap" };
        format!("{scheme} {}/{}", self.address.account(), self.mailbox())
    }

    async fn connect(&mut self) -> Result<Connection> {
        if self.blacklisted {
            return Ok(Connection::blacklisted(self.name()));
        }

        let opened = Connection::open(
            &self.address.host,
            self.address.port,
            self.tls,
            self.name(),
            &self.options,
        )
        .await;
        if let Err(Error::HandshakeFailed(_)) = &opened {
            error!(
                account = %self.address.account(),
                "TLS handshake failed; not retrying this mailbox"
            );
            self.blacklisted = true;
        }
        opened
    }

    async fn session(&self, conn: &mut Connection) -> Result<MailCounts> {
        let account = self.address.account();
        let creds = &self.address.credentials;

        let greeting = conn.expect_line("* ").await?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(Error::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        if !greeting.starts_with("* PREAUTH") {
            conn.send_redacted(
                &format!("a001 LOGIN {} {}", quote(&creds.user), quote(&creds.password)),
                &format!("a001 LOGIN {} ********", quote(&creds.user)),
            )
            .await?;
            let login = conn.expect_line("a001 ").await?;
            if !login.starts_with("a001 OK") {
                warn!(%account, "login refused; the server said: {}", login.trim_end());
                return Err(Error::AuthFailed(account));
            }
        }

        conn.send(&format!(
            "a002 STATUS {} (MESSAGES UNSEEN)",
            quote(self.mailbox())
        ))
        .await?;

        let mut counts = None;
        loop {
            let line = conn.get_line().await?;
            if line.starts_with("a002 ") {
                if !line.starts_with("a002 OK") {
                    error!(%account, "STATUS failed: {}", line.trim_end());
                    return Err(Error::Protocol(format!("STATUS failed: {}", line.trim_end())));
                }
                break;
            }
            if line.starts_with("* STATUS") {
                counts = Some(parse_status(&line)?);
            }
        }

        counts.ok_or_else(|| Error::Protocol("STATUS reply without counts".into()))
    }
}

/// Quote a string for use as an IMAP quoted string.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Pull `MESSAGES` and `UNSEEN` out of an untagged STATUS response.
///
/// `UNSEEN` above `MESSAGES` is clamped; negative counts are refused.
fn parse_status(line: &str) -> Result<MailCounts> {
    let malformed = || Error::Protocol(format!("malformed STATUS reply: {}", line.trim_end()));

    let open = line.rfind('(').ok_or_else(malformed)?;
    let close = line[open..].find(')').ok_or_else(malformed)? + open;
    let mut words = line[open + 1..close].split_whitespace();

    let (mut total, mut unread) = (None, None);
    while let (Some(key), Some(value)) = (words.next(), words.next()) {
        let value: i64 = value.parse().map_err(|_| malformed())?;
        if value < 0 {
            return Err(malformed());
        }
        if key.eq_ignore_ascii_case("MESSAGES") {
            total = Some(value);
        } else if key.eq_ignore_ascii_case("UNSEEN") {
            unread = Some(value);
        }
    }

    let (Some(total), Some(unread)) = (total, unread) else {
        return Err(malformed());
    };
    Ok(MailCounts::new(total, unread.min(total)))
}
