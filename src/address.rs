//! Network mailbox address parsing
//!
//! POP3 and IMAP entries accept two layouts after the scheme prefix:
//!
//! ```text
//! user:password@server[:port] [auth-list]      (old)
//! user password server [port] [auth-list]      (new)
//! ```
//!
//! IMAP servers may carry a `/mailbox` suffix (`mail.example.com/Lists`).

use crate::auth::{AuthList, Credentials};
use crate::error::{Error, Result};
use std::fmt;

/// Where and as whom to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub credentials: Credentials,
    pub host: String,
    pub port: u16,
    /// IMAP folder; `None` for POP3.
    pub mailbox: Option<String>,
    pub auth: AuthList,
}

impl ServerAddress {
    /// Parse the part of an address after the scheme prefix.
    ///
    /// # Errors
    ///
    /// [`Error::Address`] when the user or server is missing, the port
    /// is not a number, or a `/mailbox` appears where none is allowed.
    pub fn parse(rest: &str, default_port: u16, allow_mailbox: bool) -> Result<Self> {
        let rest = rest.trim();
        let first_space = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let old_form = rest.find(':').is_some_and(|colon| colon < first_space);

        let (user, password, server, port, auth) = if old_form {
            parse_old(rest)?
        } else {
            parse_new(rest)?
        };

        if user.is_empty() {
            return Err(Error::Address(format!("missing user in {rest:?}")));
        }

        let (host, mailbox) = match server.split_once('/') {
            Some((host, mailbox)) if allow_mailbox && !mailbox.is_empty() => {
                (host, Some(mailbox.to_string()))
            }
            Some(_) => {
                return Err(Error::Address(format!("unexpected mailbox in {server:?}")));
            }
            None => (server, None),
        };
        if host.is_empty() {
            return Err(Error::Address(format!("missing server in {rest:?}")));
        }

        let port = match port {
            Some(p) => p
                .parse()
                .map_err(|e| Error::Address(format!("invalid port {p:?}: {e}")))?,
            None => default_port,
        };

        Ok(Self {
            credentials: Credentials::new(user, password),
            host: host.to_string(),
            port,
            mailbox,
            auth: AuthList::new(auth),
        })
    }

    /// `user@host:port`, used to name connections in logs.
    #[must_use]
    pub fn account(&self) -> String {
        format!("{}@{}:{}", self.credentials.user, self.host, self.port)
    }
}

impl fmt::Debug for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAddress")
            .field("account", &self.account())
            .field("mailbox", &self.mailbox)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

type Parts<'a> = (&'a str, &'a str, &'a str, Option<&'a str>, &'a str);

fn parse_old(rest: &str) -> Result<Parts<'_>> {
    let (user, after_user) = rest
        .split_once(':')
        .ok_or_else(|| Error::Address(format!("expected user:password@server in {rest:?}")))?;
    let (password, after_at) = after_user
        .split_once('@')
        .ok_or_else(|| Error::Address(format!("expected '@server' in {rest:?}")))?;

    let server_end = after_at.find(char::is_whitespace).unwrap_or(after_at.len());
    let (server, auth) = after_at.split_at(server_end);

    let (server, port) = match server.rsplit_once(':') {
        Some((server, port)) => (server, Some(port)),
        None => (server, None),
    };
    Ok((user, password, server, port, auth.trim()))
}

fn parse_new(rest: &str) -> Result<Parts<'_>> {
    let mut words = rest.split_whitespace();
    let (Some(user), Some(password), Some(server)) = (words.next(), words.next(), words.next())
    else {
        return Err(Error::Address(format!(
            "expected 'user password server [port]' in {rest:?}"
        )));
    };

    // Whatever follows the server (and optional port) is the auth list.
    let tail = skip_words(rest, 3);
    let (port, auth) = match tail.split_once(char::is_whitespace) {
        Some((first, more)) if is_number(first) => (Some(first), more),
        None if is_number(tail) => (Some(tail), ""),
        _ => (None, tail),
    };
    Ok((user, password, server, port, auth.trim()))
}

fn skip_words(s: &str, n: usize) -> &str {
    let mut rest = s.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
