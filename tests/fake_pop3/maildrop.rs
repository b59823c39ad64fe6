//! Test data model for the fake POP3 server
//!
//! A `Maildrop` describes one account and how the server behaves:
//!
//! ```ignore
//! let maildrop = MaildropBuilder::new("alice", "secret")
//!     .messages(5)
//!     .seen(2)
//!     .timestamp("<1896.697170952@fake.test>")
//!     .without_cram_md5()
//!     .build();
//! ```

/// One POP3 account plus the server's quirks.
#[derive(Debug, Clone)]
pub struct Maildrop {
    pub user: String,
    pub password: String,
    pub messages: i64,
    /// Answer to `LAST`; `None` makes the server reject the command.
    pub seen: Option<i64>,
    /// APOP timestamp put in the greeting, brackets included.
    pub timestamp: Option<String>,
    pub cram_md5: bool,
    pub apop: bool,
    pub user_pass: bool,
    pub stat_fails: bool,
    /// Accept connections but never say anything.
    pub silent: bool,
}

pub struct MaildropBuilder {
    maildrop: Maildrop,
}

impl MaildropBuilder {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            maildrop: Maildrop {
                user: user.to_string(),
                password: password.to_string(),
                messages: 0,
                seen: Some(0),
                timestamp: None,
                cram_md5: true,
                apop: true,
                user_pass: true,
                stat_fails: false,
                silent: false,
            },
        }
    }

    pub const fn messages(mut self, count: i64) -> Self {
        self.maildrop.messages = count;
        self
    }

    pub const fn seen(mut self, count: i64) -> Self {
        self.maildrop.seen = Some(count);
        self
    }

    /// Reject `LAST`, as RFC 1725 servers do.
    pub const fn without_last(mut self) -> Self {
        self.maildrop.seen = None;
        self
    }

    pub fn timestamp(mut self, timestamp: &str) -> Self {
        self.maildrop.timestamp = Some(timestamp.to_string());
        self
    }

    pub const fn without_cram_md5(mut self) -> Self {
        self.maildrop.cram_md5 = false;
        self
    }

    pub const fn without_apop(mut self) -> Self {
        self.maildrop.apop = false;
        self
    }

    pub const fn stat_fails(mut self) -> Self {
        self.maildrop.stat_fails = true;
        self
    }

    pub const fn silent(mut self) -> Self {
        self.maildrop.silent = true;
        self
    }

    pub fn build(self) -> Maildrop {
        self.maildrop
    }
}
