//! Stable identity keys for scraped messages.
//!
//! A fingerprint is derived from the raw `date`, `time`, and the first
//! [`TEXT_PREFIX_CHARS`] characters of the text. It never depends on the
//! position of a record in a scrape, since scrape order and any
//! source-assigned sequence numbers change between runs.
//!
//! Callers key records whose `time` has already been through
//! [`canonicalize`](crate::timestamp::canonicalize); read markers are not
//! stripped here.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::models::MessageRecord;

/// Number of leading characters of the message text that take part in the key.
pub const TEXT_PREFIX_CHARS: usize = 50;

/// Hex-encoded SHA-256 identity of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint from the raw parts. Empty inputs still produce a key.
pub fn fingerprint_parts(date: &str, time: &str, text: &str) -> Fingerprint {
    let prefix: String = text.chars().take(TEXT_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(date.as_bytes());
    hasher.update([0u8]);
    hasher.update(time.as_bytes());
    hasher.update([0u8]);
    hasher.update(prefix.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

pub fn fingerprint(record: &MessageRecord) -> Fingerprint {
    fingerprint_parts(&record.date, &record.time, &record.text)
}

pub fn fingerprint_set<'a, I>(records: I) -> HashSet<Fingerprint>
where
    I: IntoIterator<Item = &'a MessageRecord>,
{
    records.into_iter().map(fingerprint).collect()
}
