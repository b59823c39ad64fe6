//! Error types for mailbiff

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {0} failed")]
    HandshakeFailed(String),

    #[error("Authentication failed for {0}")]
    AuthFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0} seconds waiting for the server")]
    Timeout(u64),

    #[error("Connection closed by peer")]
    PeerClosed,

    #[error("Short write: {written} of {requested} bytes")]
    ShortWrite { written: usize, requested: usize },

    #[error("Connection {0} is blacklisted")]
    Blacklisted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid mailbox address: {0}")]
    Address(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
