//! AUTHORIZATION state handlers.
//!
//! POP3 offers several ways to log in (RFC 1939, RFC 2195):
//!
//! ```text
//!   USER alice            +OK
//!   PASS secret           +OK
//!
//!   APOP alice <md5 of timestamp + secret>
//!
//!   AUTH CRAM-MD5         + <base64 challenge>
//!   <base64 "alice hmac"> +OK
//! ```
//!
//! Each method can be switched off in the `Maildrop` to make the
//! server refuse it the way older servers do.

use super::Session;
use crate::fake_pop3::io::{read_command, reply};
use crate::fake_pop3::maildrop::Maildrop;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Challenge sent for `AUTH CRAM-MD5`.
pub const CRAM_CHALLENGE: &str = "<1896.697170952@postoffice.fake.test>";

pub async fn handle_user<S: AsyncRead + AsyncWrite + Unpin>(
    arg: &str,
    maildrop: &Maildrop,
    session: &mut Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if !maildrop.user_pass {
        return reply(stream, "-ERR USER not allowed").await;
    }
    session.user = Some(arg.to_string());
    reply(stream, "+OK send PASS").await
}

pub async fn handle_pass<S: AsyncRead + AsyncWrite + Unpin>(
    arg: &str,
    maildrop: &Maildrop,
    session: &mut Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let user = session.user.take();
    if user.as_deref() == Some(maildrop.user.as_str()) && arg == maildrop.password {
        session.authenticated = true;
        reply(stream, "+OK maildrop locked and ready").await
    } else {
        reply(stream, "-ERR invalid password").await
    }
}

pub async fn handle_apop<S: AsyncRead + AsyncWrite + Unpin>(
    arg: &str,
    maildrop: &Maildrop,
    session: &mut Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let Some(timestamp) = maildrop.timestamp.as_deref().filter(|_| maildrop.apop) else {
        return reply(stream, "-ERR APOP not supported").await;
    };
    let token = timestamp.trim_start_matches('<').trim_end_matches('>');
    let expected = format!(
        "{} {}",
        maildrop.user,
        mailbiff::apop_digest(token, &maildrop.password)
    );

    if arg == expected {
        session.authenticated = true;
        reply(stream, "+OK maildrop locked and ready").await
    } else {
        reply(stream, "-ERR permission denied").await
    }
}

/// Handle `AUTH <mechanism>`; only CRAM-MD5 is known.
pub async fn handle_auth<S: AsyncRead + AsyncWrite + Unpin>(
    arg: &str,
    maildrop: &Maildrop,
    session: &mut Session,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if !maildrop.cram_md5 || !arg.eq_ignore_ascii_case("CRAM-MD5") {
        return reply(stream, "-ERR unrecognized authentication type").await;
    }

    let challenge = STANDARD.encode(CRAM_CHALLENGE);
    reply(stream, &format!("+ {challenge}")).await?;

    let Some(answer) = read_command(stream).await else {
        return Ok(());
    };
    if answer == "*" {
        return reply(stream, "-ERR authentication cancelled").await;
    }

    let expected =
        mailbiff::cram_md5_response(&maildrop.user, &maildrop.password, &challenge);
    if expected.as_deref() == Some(answer.as_str()) {
        session.authenticated = true;
        reply(stream, "+OK maildrop locked and ready").await
    } else {
        reply(stream, "-ERR authentication failed").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_pop3::handlers::testing::{output, stream_with_input};
    use crate::fake_pop3::maildrop::MaildropBuilder;

    #[tokio::test]
    async fn user_then_pass() {
        let maildrop = MaildropBuilder::new("alice", "secret").build();
        let mut session = Session::default();
        let (client, mut stream) = stream_with_input("").await;

        handle_user("alice", &maildrop, &mut session, &mut stream)
            .await
            .unwrap();
        handle_pass("secret", &maildrop, &mut session, &mut stream)
            .await
            .unwrap();
        drop(stream);

        assert!(session.authenticated);
        let out = output(client).await;
        assert!(out.starts_with("+OK send PASS\r\n"));
        assert!(out.ends_with("+OK maildrop locked and ready\r\n"));
    }

    #[tokio::test]
    async fn wrong_password() {
        let maildrop = MaildropBuilder::new("alice", "secret").build();
        let mut session = Session {
            user: Some("alice".into()),
            authenticated: false,
        };
        let (client, mut stream) = stream_with_input("").await;

        handle_pass("guess", &maildrop, &mut session, &mut stream)
            .await
            .unwrap();
        drop(stream);

        assert!(!session.authenticated);
        assert!(output(client).await.starts_with("-ERR"));
    }

    #[tokio::test]
    async fn apop_rfc1939_example() {
        let maildrop = MaildropBuilder::new("mrose", "tanstaaf")
            .timestamp("<1896.697170952@dbc.mtview.ca.us>")
            .build();
        let mut session = Session::default();
        let (client, mut stream) = stream_with_input("").await;

        handle_apop(
            "mrose c4c9334bac560ecc979e58001b3e22fb",
            &maildrop,
            &mut session,
            &mut stream,
        )
        .await
        .unwrap();
        drop(stream);

        assert!(session.authenticated);
        assert!(output(client).await.starts_with("+OK"));
    }

    #[tokio::test]
    async fn cram_md5_exchange() {
        let maildrop = MaildropBuilder::new("tim", "tanstaaftanstaaf").build();
        let challenge = STANDARD.encode(CRAM_CHALLENGE);
        let answer = mailbiff::cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap();
        let mut session = Session::default();
        let (client, mut stream) = stream_with_input(&format!("{answer}\r\n")).await;

        handle_auth("CRAM-MD5", &maildrop, &mut session, &mut stream)
            .await
            .unwrap();
        drop(stream);

        assert!(session.authenticated);
        let out = output(client).await;
        assert!(out.starts_with(&format!("+ {challenge}\r\n")));
        assert!(out.ends_with("+OK maildrop locked and ready\r\n"));
    }

    #[tokio::test]
    async fn cram_md5_switched_off() {
        let maildrop = MaildropBuilder::new("tim", "x").without_cram_md5().build();
        let mut session = Session::default();
        let (client, mut stream) = stream_with_input("").await;

        handle_auth("CRAM-MD5", &maildrop, &mut session, &mut stream)
            .await
            .unwrap();
        drop(stream);

        assert!(output(client).await.starts_with("-ERR"));
    }
}
