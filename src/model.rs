//! Records flowing through one export: the request, the raw API records and
//! the resolved document handed to renderers.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Slack refuses page sizes above this.
pub const SLACK_PAGE_CEILING: u16 = 1000;
pub const DEFAULT_PAGE_SIZE: u16 = 200;
pub const DEFAULT_MAX_MESSAGES: usize = 1000;
pub const DEFAULT_MAX_THREAD_MESSAGES: usize = 500;

/// A Slack message timestamp (`"1700000000.000100"`), ordered numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ts(String);

impl Ts {
    pub fn new(raw: impl Into<String>) -> Self {
        Ts(raw.into())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Ts(format!("{}.{:06}", dt.timestamp(), dt.timestamp_subsec_micros()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seconds and microseconds; unparsable parts count as zero.
    fn parts(&self) -> (i64, u32) {
        let (secs, frac) = self.0.split_once('.').unwrap_or((self.0.as_str(), ""));
        let secs = secs.trim().parse().unwrap_or_default();
        let mut micros: String = frac.chars().filter(|c| c.is_ascii_digit()).take(6).collect();
        while micros.len() < 6 {
            micros.push('0');
        }
        (secs, micros.parse().unwrap_or_default())
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let (secs, micros) = self.parts();
        DateTime::from_timestamp(secs, micros * 1000)
    }
}

impl Ord for Ts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts()
            .cmp(&other.parts())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Ts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of one export. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSpec {
    pub channel_id: String,
    pub oldest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub max_messages: usize,
    pub max_messages_per_thread: usize,
    pub page_size: u16,
}

impl ChannelSpec {
    pub fn new(channel_id: impl Into<String>) -> Self {
        ChannelSpec {
            channel_id: channel_id.into(),
            oldest: None,
            latest: None,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_messages_per_thread: DEFAULT_MAX_THREAD_MESSAGES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_oldest(mut self, oldest: Option<DateTime<Utc>>) -> Self {
        self.oldest = oldest;
        self
    }

    pub fn with_latest(mut self, latest: Option<DateTime<Utc>>) -> Self {
        self.latest = latest;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_max_messages_per_thread(mut self, max: usize) -> Self {
        self.max_messages_per_thread = max;
        self
    }

    /// Clamped to `1..=SLACK_PAGE_CEILING`.
    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size.clamp(1, SLACK_PAGE_CEILING);
        self
    }

    pub fn oldest_ts(&self) -> Option<Ts> {
        self.oldest.map(Ts::from_datetime)
    }

    pub fn latest_ts(&self) -> Option<Ts> {
        self.latest.map(Ts::from_datetime)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReaction {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// A legacy secondary attachment, as integrations and bots still post them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub pretext: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_link: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}

/// One message or thread reply as the API returned it, read from Slack's
/// message JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub ts: Ts,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub blocks: Vec<serde_json::Value>,
    #[serde(default)]
    pub thread_ts: Option<Ts>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reply_count: usize,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reactions: Vec<RawReaction>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<RawFile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RawAttachment>,
}

impl RawRecord {
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn is_thread_root(&self) -> bool {
        self.reply_count > 0 && self.thread_ts.as_ref() == Some(&self.ts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Channel,
    Usergroup,
    Bot,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Channel => "channel",
            EntityKind::Usergroup => "usergroup",
            EntityKind::Bot => "bot",
        }
    }

    /// Stand-in name for an entity that could not be resolved.
    pub fn placeholder(self, id: &str) -> String {
        format!("unknown_{}_{}", self.as_str(), id)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A display name cached under `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityName {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub found: bool,
}

impl EntityName {
    pub fn found(kind: EntityKind, id: &str, name: String) -> Self {
        EntityName {
            kind,
            id: id.to_string(),
            name,
            found: true,
        }
    }

    pub fn placeholder(kind: EntityKind, id: &str) -> Self {
        EntityName {
            kind,
            id: id.to_string(),
            name: kind.placeholder(id),
            found: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Root,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedFile {
    pub name: String,
    pub url: Option<String>,
}

/// An attachment with its mrkdwn converted. `text` falls back to the
/// attachment's plain `fallback` when it has no text of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub title: Option<String>,
    pub title_link: Option<String>,
    pub author_name: Option<String>,
    pub pretext: Option<String>,
    pub text: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub ordinal: usize,
    pub depth: Depth,
    pub author: String,
    pub channel: String,
    pub ts: Ts,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub subtype: Option<String>,
    pub reply_count: usize,
    pub replies_unavailable: bool,
    pub reactions: Vec<Reaction>,
    pub files: Vec<SharedFile>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn is_reply(&self) -> bool {
        self.depth == Depth::Reply
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    UnknownEntity { entity: EntityKind, id: String },
    ResolutionFailed { entity: EntityKind, id: String, reason: String },
    RepliesUnavailable { reason: String },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::UnknownEntity { entity, id } => write!(f, "unknown {entity} {id}"),
            IssueKind::ResolutionFailed { entity, id, reason } => {
                write!(f, "could not resolve {entity} {id}: {reason}")
            }
            IssueKind::RepliesUnavailable { reason } => write!(f, "replies unavailable: {reason}"),
        }
    }
}

/// A non-fatal problem met while building one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub ts: Option<Ts>,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ts {
            Some(ts) => write!(f, "[{ts}] {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Records the API returned, root copies in reply pages excluded.
    pub total_fetched: usize,
    pub total_after_cap: usize,
    pub dropped_messages: usize,
    pub dropped_replies: usize,
    /// The top-level cap was hit while the API still reported more pages.
    pub truncated: bool,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub issues: Vec<Issue>,
}

/// The ordered result of one export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub spec: ChannelSpec,
    pub channel_name: String,
    pub messages: Vec<Message>,
    pub summary: Summary,
}

impl Document {
    /// Produced, but with at least one degraded record.
    pub fn is_partial(&self) -> bool {
        !self.summary.issues.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_reply())
    }

    /// Replies directly following the root at `ordinal`.
    pub fn replies_of(&self, ordinal: usize) -> &[Message] {
        let start = ordinal + 1;
        let Some(rest) = self.messages.get(start..) else {
            return &[];
        };
        let len = rest.iter().take_while(|m| m.is_reply()).count();
        &rest[..len]
    }
}
