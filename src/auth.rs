//! POP3 authentication strategies
//!
//! Three methods are compiled in and tried in a fixed order, digest
//! methods first:
//!
//! 1. `cram-md5`: `AUTH CRAM-MD5`, answer the base64 challenge with
//!    `user HMAC-MD5(secret, challenge)`.
//! 2. `apop`: `APOP user MD5(<timestamp>secret)`, only when the
//!    greeting carried a timestamp.
//! 3. `plaintext`: `USER` / `PASS`.
//!
//! A configured allow-list restricts which methods are tried.

use crate::error::{Error, Result};
use crate::reply::ServerReply;
use crate::transport::Connection;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use std::fmt;
use tracing::{error, warn};

type HmacMd5 = Hmac<Md5>;

/// User name and secret for one account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// A compiled-in authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    CramMd5,
    Apop,
    Plaintext,
}

impl AuthMethod {
    /// Every method, in the order they are tried.
    pub const ALL: [Self; 3] = [Self::CramMd5, Self::Apop, Self::Plaintext];

    /// Name matched against the allow-list.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CramMd5 => "cram-md5",
            Self::Apop => "apop",
            Self::Plaintext => "plaintext",
        }
    }

    /// Run this method against a connection whose greeting was read.
    ///
    /// # Errors
    ///
    /// Transport failures only; a server refusal is reported as
    /// [`Attempt::Rejected`].
    pub async fn attempt(
        self,
        conn: &mut Connection,
        creds: &Credentials,
        challenge: Option<&str>,
    ) -> Result<Attempt> {
        match self {
            Self::CramMd5 => cram_md5(conn, creds).await,
            Self::Apop => match challenge {
                Some(challenge) => apop(conn, creds, challenge).await,
                None => Ok(Attempt::Unsupported),
            },
            Self::Plaintext => plaintext(conn, creds).await,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one method against one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Accepted,
    /// The server refused; carries its reply text.
    Rejected(String),
    /// The server does not offer this method.
    Unsupported,
}

/// Lower-cased list of allowed method names; empty allows everything.
///
/// Matching is by substring, so `"cram-md5 plaintext"` allows two
/// methods and skips APOP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthList(String);

impl AuthList {
    #[must_use]
    pub fn new(list: &str) -> Self {
        Self(list.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn allows(&self, method: AuthMethod) -> bool {
        self.0.is_empty() || self.0.contains(method.name())
    }

    /// Allowed methods in priority order.
    pub fn methods(&self) -> impl Iterator<Item = AuthMethod> + '_ {
        AuthMethod::ALL.into_iter().filter(|m| self.allows(*m))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Try each allowed method until the server accepts one.
///
/// `account` identifies the mailbox in logs; the secret never appears.
///
/// # Errors
///
/// [`Error::AuthFailed`] when every allowed method was refused or
/// unavailable; transport errors abort the negotiation immediately.
pub async fn negotiate(
    conn: &mut Connection,
    creds: &Credentials,
    challenge: Option<&str>,
    allowed: &AuthList,
    account: &str,
) -> Result<AuthMethod> {
    for method in allowed.methods() {
        match method.attempt(conn, creds, challenge).await? {
            Attempt::Accepted => {
                tracing::debug!(account, %method, "authenticated");
                return Ok(method);
            }
            Attempt::Rejected(reply) => {
                warn!(account, %method, "authentication refused; the server said: {reply}");
            }
            Attempt::Unsupported => {
                tracing::debug!(account, %method, "not offered by server");
            }
        }
    }

    error!(account, "all authentication methods failed");
    Err(Error::AuthFailed(account.to_string()))
}

async fn plaintext(conn: &mut Connection, creds: &Credentials) -> Result<Attempt> {
    conn.send(&format!("USER {}", creds.user)).await?;
    let reply = ServerReply::new(&conn.get_line().await?);
    if !reply.is_positive() {
        return Ok(Attempt::Rejected(reply.to_string()));
    }

    conn.send_redacted(&format!("PASS {}", creds.password), "PASS ********")
        .await?;
    let reply = ServerReply::new(&conn.get_line().await?);
    if !reply.is_positive() {
        return Ok(Attempt::Rejected(reply.to_string()));
    }
    Ok(Attempt::Accepted)
}

async fn apop(conn: &mut Connection, creds: &Credentials, challenge: &str) -> Result<Attempt> {
    let digest = apop_digest(challenge, &creds.password);
    conn.send(&format!("APOP {} {digest}", creds.user)).await?;

    let reply = ServerReply::new(&conn.get_line().await?);
    if reply.is_positive() {
        Ok(Attempt::Accepted)
    } else {
        Ok(Attempt::Rejected(reply.to_string()))
    }
}

async fn cram_md5(conn: &mut Connection, creds: &Credentials) -> Result<Attempt> {
    conn.send("AUTH CRAM-MD5").await?;
    let probe = ServerReply::new(&conn.get_line().await?);
    let Some(challenge) = probe.continuation_data() else {
        return Ok(Attempt::Unsupported);
    };

    let Some(response) = cram_md5_response(&creds.user, &creds.password, challenge) else {
        // Cancel the exchange.
        conn.send("*").await?;
        let _ = conn.get_line().await?;
        return Ok(Attempt::Rejected(format!("undecodable challenge {challenge:?}")));
    };

    conn.send(&response).await?;
    let reply = ServerReply::new(&conn.get_line().await?);
    if reply.is_positive() {
        Ok(Attempt::Accepted)
    } else {
        Ok(Attempt::Rejected(reply.to_string()))
    }
}

/// `MD5("<" challenge ">" secret)` as lowercase hex.
#[must_use]
pub fn apop_digest(challenge: &str, secret: &str) -> String {
    let digest = Md5::digest(format!("<{challenge}>{secret}").as_bytes());
    to_hex(&digest)
}

/// Base64 CRAM-MD5 answer to a base64 challenge, or `None` if the
/// challenge is not valid base64.
#[must_use]
pub fn cram_md5_response(user: &str, secret: &str, challenge_b64: &str) -> Option<String> {
    let challenge = STANDARD.decode(challenge_b64).ok()?;
    let mut mac = <HmacMd5 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();
    Some(STANDARD.encode(format!("{user} {}", to_hex(&digest))))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
