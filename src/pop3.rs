//! POP3 message-count checker
//!
//! One check is a full session:
//!
//! ```text
//! connect -> greeting -> authenticate -> STAT -> LAST -> QUIT -> close
//! ```
//!
//! `LAST` was dropped from POP3 by RFC 1725, so a negative reply to it
//! is not an error: every message is then counted as unread.

use crate::address::ServerAddress;
use crate::auth;
use crate::error::{Error, Result};
use crate::reply::{ServerReply, apop_challenge};
use crate::status::MailCounts;
use crate::transport::{ConnectOptions, Connection};
use tracing::error;

pub const DEFAULT_PORT: u16 = 110;
pub const DEFAULT_TLS_PORT: u16 = 995;

/// Polls one POP3 account.
#[derive(Debug)]
pub struct Pop3Checker {
    address: ServerAddress,
    tls: bool,
    options: ConnectOptions,
    blacklisted: bool,
}

impl Pop3Checker {
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

    /// `true` once a TLS handshake has failed; no further I/O is tried.
    #[must_use]
    pub const fn is_blacklisted(&self) -> bool {
        self.blacklisted
    }

    /// Run one session and return the mailbox counts.
    ///
    /// # Errors
    ///
    /// Any connect, handshake, authentication, protocol or transport
    /// failure. The connection is always closed before returning.
    pub async fn check(&mut self) -> Result<MailCounts> {
        let mut conn = self.connect().await?;

        let result = self.session(&mut conn).await;
        if !conn.is_blacklisted() {
            // Best effort: the server may already be gone.
            let _ = conn.send("QUIT").await;
        }
        conn.close().await;
        result
    }

    // -- private helpers --

    fn name(&self) -> String {
        let scheme = if self.tls { "pop3s" } else { "pop3" };
        format!("{scheme} {}", self.address.account())
    }

    async fn connect(&mut self) -> Result<Connection> {
        if self.blacklisted {
            return Ok(Connection::blacklisted(self.name()));
        }

        match Connection::open(
            &self.address.host,
            self.address.port,
            self.tls,
            self.name(),
            &self.options,
        )
        .await
        {
            Ok(conn) => Ok(conn),
            Err(e @ Error::HandshakeFailed(_)) => {
                error!(
                    account = %self.address.account(),
                    "TLS handshake failed; not retrying this mailbox"
                );
                self.blacklisted = true;
                Err(e)
            }
            Err(e) => {
                error!(account = %self.address.account(), "not connected: {e}");
                Err(e)
            }
        }
    }

    async fn session(&self, conn: &mut Connection) -> Result<MailCounts> {
        let account = self.address.account();

        let greeting = ServerReply::new(&conn.get_line().await?);
        chatter!(self.options.verbose, %account, "greeting: {greeting}");
        if !greeting.is_positive() {
            return Err(Error::Protocol(format!("unexpected greeting: {greeting}")));
        }
        let challenge = apop_challenge(greeting.as_str());

        auth::negotiate(
            conn,
            &self.address.credentials,
            challenge,
            &self.address.auth,
            &account,
        )
        .await?;

        conn.send("STAT").await?;
        let stat = ServerReply::new(&conn.get_line().await?);
        let Some(total) = stat.count().filter(|n| *n >= 0) else {
            error!(%account, "error receiving stats; the server said: {stat}");
            return Err(Error::Protocol(format!("STAT failed: {stat}")));
        };

        conn.send("LAST").await?;
        let last = ServerReply::new(&conn.get_line().await?);
        let unread = unread_after_last(total, &last).unwrap_or_else(|| {
            chatter!(self.options.verbose, %account, "LAST not supported: {last}");
            total
        });

        Ok(MailCounts::new(total, unread))
    }
}

/// Unread messages implied by a `LAST` reply, or `None` when the reply
/// carries no usable message number.
fn unread_after_last(total: i64, last: &ServerReply) -> Option<i64> {
    let seen = last.count().filter(|n| *n >= 0)?;
    Some(total.saturating_sub(seen).clamp(0, total))
}
