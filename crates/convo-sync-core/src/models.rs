//! Core data models used throughout convo-sync.
//!
//! These types represent the scraped messages, the data-set selectors, and
//! the query results that flow through the synchronization pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The local user running the tool.
    #[serde(rename = "self")]
    Me,
    /// The remote correspondent.
    Partner,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Me => "self",
            Speaker::Partner => "partner",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speaker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(Speaker::Me),
            "partner" => Ok(Speaker::Partner),
            other => anyhow::bail!("Unknown speaker: '{}'. Must be self or partner.", other),
        }
    }
}

/// A single scraped chat message.
///
/// `date` and `time` are kept exactly as the source rendered them. Parsing
/// into an instant happens through a [`TimestampParser`](crate::timestamp::TimestampParser).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub date: String,
    pub time: String,
    pub speaker: Speaker,
    pub text: String,
}

impl MessageRecord {
    pub fn new(
        date: impl Into<String>,
        time: impl Into<String>,
        speaker: Speaker,
        text: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            speaker,
            text: text.into(),
        }
    }

    /// The text that gets embedded and stored as the entry's content.
    pub fn content(&self) -> String {
        format!("{} {} [{}] {}", self.date, self.time, self.speaker, self.text)
    }
}

/// Which slice of the conversation an index covers.
///
/// Each data type owns its own index directory and metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Only the partner's messages.
    PartnerOnly,
    /// Both sides of the conversation.
    FullConversation,
    /// The full-history partner scrape; filtered like `PartnerOnly`.
    AllMessages,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::PartnerOnly => "partner_only",
            DataType::FullConversation => "full_conversation",
            DataType::AllMessages => "all_messages",
        }
    }

    /// Whether a record of the given speaker belongs in this data set.
    pub fn includes(&self, speaker: Speaker) -> bool {
        match self {
            DataType::FullConversation => true,
            DataType::PartnerOnly | DataType::AllMessages => speaker == Speaker::Partner,
        }
    }

    /// Keep only the records that belong in this data set, preserving order.
    pub fn select(&self, records: Vec<MessageRecord>) -> Vec<MessageRecord> {
        records
            .into_iter()
            .filter(|r| self.includes(r.speaker))
            .collect()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partner_only" => Ok(DataType::PartnerOnly),
            "full_conversation" => Ok(DataType::FullConversation),
            "all_messages" => Ok(DataType::AllMessages),
            other => anyhow::bail!(
                "Unknown data type: '{}'. Available: partner_only, full_conversation, all_messages",
                other
            ),
        }
    }
}

/// An entry read back from an index, with its similarity score when it
/// came out of a query.
#[derive(Debug, Clone)]
pub struct IndexedMessage {
    pub record: MessageRecord,
    pub score: f64,
}
