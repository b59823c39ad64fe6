//! POP3 command handlers for the fake server.
//!
//! `authorization` covers the AUTHORIZATION state (USER, PASS, APOP,
//! AUTH CRAM-MD5); `transaction` covers STAT, LAST and QUIT.

mod authorization;
mod transaction;

pub use authorization::{handle_apop, handle_auth, handle_pass, handle_user};
pub use transaction::{handle_last, handle_quit, handle_stat};

/// Per-connection state.
#[derive(Debug, Default)]
pub struct Session {
    /// Name given by USER, waiting for PASS.
    pub user: Option<String>,
    pub authenticated: bool,
}

#[cfg(test)]
pub mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// A server-side stream whose client side has already sent `input`.
    pub async fn stream_with_input(input: &str) -> (DuplexStream, BufReader<DuplexStream>) {
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(input.as_bytes()).await.unwrap();
        (client, BufReader::new(server))
    }

    /// Everything the server wrote, once it has dropped its side.
    pub async fn output(mut client: DuplexStream) -> String {
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }
}
