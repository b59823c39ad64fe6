//! Test data model for the fake IMAP server
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new("alice", "secret")
//!     .folder("INBOX", 12, 3)
//!     .folder("Lists", 40, 0)
//!     .build();
//! ```
//!
//! Only counts are modelled: STATUS reports `MESSAGES` and `UNSEEN`
//! straight from the folder.

/// One account: credentials and the folders it can see.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub user: String,
    pub password: String,
    pub folders: Vec<Folder>,
}

impl Mailbox {
    /// Look up a folder by name (case-sensitive, except INBOX).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| {
            f.name == name || (name.eq_ignore_ascii_case("INBOX") && f.name == "INBOX")
        })
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub messages: u32,
    pub unseen: u32,
}

pub struct MailboxBuilder {
    mailbox: Mailbox,
}

impl MailboxBuilder {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            mailbox: Mailbox {
                user: user.to_string(),
                password: password.to_string(),
                folders: Vec::new(),
            },
        }
    }

    pub fn folder(mut self, name: &str, messages: u32, unseen: u32) -> Self {
        self.mailbox.folders.push(Folder {
            name: name.to_string(),
            messages,
            unseen,
        });
        self
    }

    pub fn build(self) -> Mailbox {
        self.mailbox
    }
}
