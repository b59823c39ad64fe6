//! In-process fake IMAP server for integration testing
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP (or implicit TLS for imaps)
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready\r\n"
//!       |
//!   a001 LOGIN user pass
//!       |
//!   a002 STATUS mailbox (MESSAGES UNSEEN)
//!       |
//!   a003 LOGOUT
//! ```
//!
//! Lines prefixed with `*` are **untagged** responses; the tagged
//! OK/NO/BAD line carrying the client's tag ends each command.

use super::handlers::{handle_login, handle_logout, handle_status};
use super::io::write_line;
use super::mailbox::Mailbox;
use crate::fake_tls;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A fake IMAP server on localhost with an OS-assigned port.
pub struct FakeImapServer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a plaintext server.
    pub async fn start(mailbox: Mailbox) -> Self {
        Self::spawn(mailbox, None).await
    }

    /// Start a server that speaks TLS from the first byte (`imaps`).
    pub async fn start_tls(mailbox: Mailbox) -> Self {
        Self::spawn(mailbox, Some(fake_tls::acceptor())).await
    }

    async fn spawn(mailbox: Mailbox, acceptor: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let mailbox = Arc::new(mailbox);
        let commands = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let commands = commands.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let acceptor = acceptor.clone();
                    let mailbox = mailbox.clone();
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        match acceptor {
                            Some(acceptor) => {
                                let Ok(tls) = acceptor.accept(stream).await else {
                                    return;
                                };
                                handle_imap_session(tls, &mailbox, &commands).await;
                            }
                            None => handle_imap_session(stream, &mailbox, &commands).await,
                        }
                    });
                }
            })
        };

        Self {
            port,
            commands,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Every command line received so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Extract the folder name from a parsed `imap_types::Mailbox`.
fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Split the arguments after `tag LOGIN` into astrings.
///
/// `imap-codec` has already validated the syntax; this only recovers
/// the plain values of quoted or atom arguments.
fn login_args(line: &str) -> Option<(String, String)> {
    let rest = line.trim_end().splitn(3, ' ').nth(2)?;
    let mut args = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ' ' {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
            args.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            args.push(value);
        }
    }

    let mut args = args.into_iter();
    Some((args.next()?, args.next()?))
}

/// Run one IMAP conversation.
///
/// Uses `imap-codec`'s `CommandCodec` to parse each client command,
/// then dispatches on the `CommandBody` variant.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mailbox,
    commands: &Mutex<Vec<String>>,
) {
    let mut reader = BufReader::new(stream);
    let codec = CommandCodec::default();

    if write_line(&mut reader, "* OK [CAPABILITY IMAP4rev1] Fake server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    let mut authenticated = false;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        commands.lock().unwrap().push(trimmed.to_string());

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();

        match command.body {
            CommandBody::Login { .. } => {
                let Some((user, password)) = login_args(trimmed) else {
                    break;
                };
                authenticated = handle_login(tag, &user, &password, mailbox, &mut reader).await;
            }
            CommandBody::Status { mailbox: mb, .. } if authenticated => {
                let name = mailbox_name(&mb);
                handle_status(tag, &name, mailbox, &mut reader).await;
            }
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => {
                let resp = format!("{tag} BAD Unknown command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::login_args;

    #[test]
    fn login_args_quoted_and_atoms() {
        assert_eq!(
            login_args("a001 LOGIN \"alice\" \"p\\\"w\"\r\n"),
            Some(("alice".into(), "p\"w".into()))
        );
        assert_eq!(
            login_args("a001 LOGIN alice secret"),
            Some(("alice".into(), "secret".into()))
        );
        assert_eq!(login_args("a001 LOGIN alice"), None);
    }
}
