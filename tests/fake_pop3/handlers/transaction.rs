//! TRANSACTION state handlers.
//!
//! ```text
//!   STAT    +OK <count> <octets>
//!   LAST    +OK <highest message number accessed>
//!   QUIT    +OK
//! ```
//!
//! `LAST` was removed in RFC 1725; a `Maildrop` built with
//! `without_last()` rejects it the way modern servers do.

use super::Session;
use crate::fake_pop3::io::reply;
use crate::fake_pop3::maildrop::Maildrop;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_stat<S: AsyncRead + AsyncWrite + Unpin>(
    maildrop: &Maildrop,
    session: &Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if !session.authenticated {
        return reply(stream, "-ERR not authenticated").await;
    }
    if maildrop.stat_fails {
        return reply(stream, "-ERR maildrop busy").await;
    }
    let octets = maildrop.messages * 120;
    reply(stream, &format!("+OK {} {octets}", maildrop.messages)).await
}

pub async fn handle_last<S: AsyncRead + AsyncWrite + Unpin>(
    maildrop: &Maildrop,
    session: &Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    match maildrop.seen {
        Some(seen) if session.authenticated => reply(stream, &format!("+OK {seen}")).await,
        Some(_) => reply(stream, "-ERR not authenticated").await,
        None => reply(stream, "-ERR unknown command").await,
    }
}

pub async fn handle_quit<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    reply(stream, "+OK bye").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_pop3::handlers::testing::{output, stream_with_input};
    use crate::fake_pop3::maildrop::MaildropBuilder;

    fn logged_in() -> Session {
        Session {
            user: None,
            authenticated: true,
        }
    }

    #[tokio::test]
    async fn stat_reports_count() {
        let maildrop = MaildropBuilder::new("a", "b").messages(4).build();
        let (client, mut stream) = stream_with_input("").await;
        handle_stat(&maildrop, &logged_in(), &mut stream).await.unwrap();
        drop(stream);
        assert_eq!(output(client).await, "+OK 4 480\r\n");
    }

    #[tokio::test]
    async fn stat_requires_login() {
        let maildrop = MaildropBuilder::new("a", "b").build();
        let (client, mut stream) = stream_with_input("").await;
        handle_stat(&maildrop, &Session::default(), &mut stream)
            .await
            .unwrap();
        drop(stream);
        assert!(output(client).await.starts_with("-ERR"));
    }

    #[tokio::test]
    async fn last_can_be_rejected() {
        let maildrop = MaildropBuilder::new("a", "b").without_last().build();
        let (client, mut stream) = stream_with_input("").await;
        handle_last(&maildrop, &logged_in(), &mut stream).await.unwrap();
        drop(stream);
        assert_eq!(output(client).await, "-ERR unknown command\r\n");
    }

    #[tokio::test]
    async fn last_reports_seen() {
        let maildrop = MaildropBuilder::new("a", "b").messages(9).seen(6).build();
        let (client, mut stream) = stream_with_input("").await;
        handle_last(&maildrop, &logged_in(), &mut stream).await.unwrap();
        drop(stream);
        assert_eq!(output(client).await, "+OK 6\r\n");
    }
}
