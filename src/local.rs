//! Local mail store checkers: maildir directories and mbox spool files
//!
//! Both remember the modification time and size of what they counted
//! and only rescan when either changes.

use crate::error::Result;
use crate::status::MailCounts;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error};

/// Change detector for one file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl Stamp {
    async fn of(path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Counts `new/` (unread) and `new/` + `cur/` (total) of a maildir.
#[derive(Debug)]
pub struct MaildirChecker {
    path: PathBuf,
    cached: Option<([Stamp; 2], MailCounts)>,
}

impl MaildirChecker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached reading so the next check rescans.
    pub const fn forget(&mut self) {
        self.cached = None;
    }

    /// # Errors
    ///
    /// [`crate::Error::Io`] if `new/` or `cur/` cannot be read.
    pub async fn check(&mut self) -> Result<MailCounts> {
        let new_dir = self.path.join("new");
        let cur_dir = self.path.join("cur");

        let stamps = [
            stamp_or_log(&new_dir).await?,
            stamp_or_log(&cur_dir).await?,
        ];
        if let Some((cached_stamps, counts)) = self.cached {
            if cached_stamps == stamps {
                debug!(path = %self.path.display(), "maildir unchanged");
                return Ok(counts);
            }
        }

        let unread = count_entries(&new_dir).await?;
        let seen = count_entries(&cur_dir).await?;
        let counts = MailCounts::new(unread + seen, unread);
        self.cached = Some((stamps, counts));
        Ok(counts)
    }
}

async fn stamp_or_log(path: &Path) -> Result<Stamp> {
    Stamp::of(path).await.map_err(|e| {
        error!("Can't stat mailbox '{}': {e}", path.display());
        e.into()
    })
}

async fn count_entries(dir: &Path) -> Result<i64> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        error!("Error opening directory '{}': {e}", dir.display());
        e
    })?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with('.') {
            count += 1;
        }
    }
    Ok(count)
}

/// Counts messages in an mbox spool file.
///
/// A message starts at a `From ` line at the top of the file or after
/// a blank line. It is read when its header block has a `Status:`
/// field containing `R`. A missing file is an empty mailbox.
#[derive(Debug)]
pub struct MboxChecker {
    path: PathBuf,
    cached: Option<(Stamp, MailCounts)>,
}

impl MboxChecker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn forget(&mut self) {
        self.cached = None;
    }

    /// # Errors
    ///
    /// [`crate::Error::Io`] if the file exists but cannot be read.
    pub async fn check(&mut self) -> Result<MailCounts> {
        let stamp = match Stamp::of(&self.path).await {
            Ok(stamp) => stamp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no spool file");
                self.cached = None;
                return Ok(MailCounts::new(0, 0));
            }
            Err(e) => {
                error!("Can't stat mailbox '{}': {e}", self.path.display());
                return Err(e.into());
            }
        };
        if let Some((cached_stamp, counts)) = self.cached {
            if cached_stamp == stamp {
                return Ok(counts);
            }
        }

        let contents = tokio::fs::read(&self.path).await?;
        let counts = count_mbox(&contents);
        self.cached = Some((stamp, counts));
        Ok(counts)
    }
}

fn count_mbox(contents: &[u8]) -> MailCounts {
    let mut total = 0;
    let mut read = 0;
    let mut in_headers = false;
    let mut previous_blank = true;

    for line in contents.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if previous_blank && line.starts_with(b"From ") {
            total += 1;
            in_headers = true;
        } else if in_headers {
            if line.is_empty() {
                in_headers = false;
            } else if let Some(value) = strip_prefix_ignore_case(line, b"status:") {
                if value.contains(&b'R') {
                    read += 1;
                }
            }
        }
        previous_blank = line.is_empty();
    }
    MailCounts::new(total, total - read)
}

fn strip_prefix_ignore_case<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    (line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix))
        .then(|| &line[prefix.len()..])
}
