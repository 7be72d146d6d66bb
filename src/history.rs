//! Channel history retrieval: the capped top-level timeline, then the
//! replies of every thread root in it.

use tracing::{debug, info, warn};

use crate::error::{AppError, Result, Stage};
use crate::gateway::{Endpoint, Gateway, ListParams, SlackApi};
use crate::model::{ChannelSpec, RawRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Replies {
    /// Not a thread root.
    None,
    Loaded {
        replies: Vec<RawRecord>,
        /// Replies left out by the per-thread cap.
        dropped: usize,
    },
    /// The thread could not be fetched; the root is kept regardless.
    Unavailable { reason: String },
}

impl Replies {
    pub fn records(&self) -> &[RawRecord] {
        match self {
            Replies::Loaded { replies, .. } => replies,
            Replies::None | Replies::Unavailable { .. } => &[],
        }
    }

    pub fn dropped(&self) -> usize {
        match self {
            Replies::Loaded { dropped, .. } => *dropped,
            Replies::None | Replies::Unavailable { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub record: RawRecord,
    pub replies: Replies,
}

/// Top-level records ascending by timestamp, each with its replies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelHistory {
    pub messages: Vec<FetchedMessage>,
    /// Records received from the API, root copies in reply pages excluded.
    pub fetched: usize,
    pub dropped_messages: usize,
    pub dropped_replies: usize,
    /// The top-level cap was reached while more history was available.
    pub truncated: bool,
}

impl ChannelHistory {
    pub fn record_count(&self) -> usize {
        self.messages
            .iter()
            .map(|m| 1 + m.replies.records().len())
            .sum()
    }
}

/// Fetch the top-level history of `spec.channel_id` and then every
/// thread's replies.
///
/// Slack lists history newest first, so the cap keeps the newest
/// `max_messages` records. A failure on the top-level walk aborts; a
/// failing thread only marks its root.
pub async fn fetch_channel_history<A: SlackApi>(
    gateway: &Gateway<A>,
    spec: &ChannelSpec,
) -> Result<ChannelHistory> {
    info!(channel = %spec.channel_id, max_messages = spec.max_messages, "fetching history");

    let params = ListParams {
        channel: spec.channel_id.clone(),
        thread_ts: None,
        oldest: spec.oldest_ts(),
        latest: spec.latest_ts(),
    };
    let mut pages = gateway.fetch_pages(
        Endpoint::ConversationsHistory,
        params.clone(),
        spec.page_size,
        Some(spec.max_messages),
    );
    let mut top_level = Vec::new();
    loop {
        match pages.next_page().await {
            Ok(Some(records)) => top_level.extend(records),
            Ok(None) => break,
            Err(source) => {
                return Err(AppError::Export {
                    stage: Stage::History,
                    messages_fetched: pages.yielded(),
                    cursor: pages.cursor().map(str::to_owned),
                    source,
                });
            }
        }
    }
    top_level.sort_by(|a, b| a.ts.cmp(&b.ts));

    let mut history = ChannelHistory {
        fetched: pages.yielded() + pages.dropped(),
        dropped_messages: pages.dropped(),
        truncated: pages.is_truncated(),
        ..ChannelHistory::default()
    };
    if history.truncated {
        info!(
            kept = top_level.len(),
            dropped = history.dropped_messages,
            "message cap reached"
        );
    }

    for record in top_level {
        let replies = if record.is_thread_root() {
            let (replies, received) = fetch_replies(gateway, spec, &params, &record).await;
            history.fetched += received;
            history.dropped_replies += replies.dropped();
            replies
        } else {
            Replies::None
        };
        history.messages.push(FetchedMessage { record, replies });
    }

    info!(
        messages = history.messages.len(),
        records = history.record_count(),
        dropped_replies = history.dropped_replies,
        "history fetched"
    );
    Ok(history)
}

/// Replies of one thread root, plus how many records the API returned.
async fn fetch_replies<A: SlackApi>(
    gateway: &Gateway<A>,
    spec: &ChannelSpec,
    params: &ListParams,
    root: &RawRecord,
) -> (Replies, usize) {
    let cap = spec.max_messages_per_thread;
    if cap == 0 {
        return (
            Replies::Loaded {
                replies: Vec::new(),
                dropped: root.reply_count,
            },
            0,
        );
    }

    let params = ListParams {
        thread_ts: Some(root.ts.clone()),
        ..params.clone()
    };
    // one extra slot for the root copy the replies endpoint leads with
    let mut pages = gateway.fetch_pages(
        Endpoint::ConversationsReplies,
        params,
        spec.page_size,
        Some(cap + 1),
    );
    match pages.collect_all().await {
        Ok(records) => {
            let records: Vec<RawRecord> =
                records.into_iter().filter(|r| r.ts != root.ts).collect();
            let received = records.len() + pages.dropped();
            let (replies, dropped) =
                cap_replies(records, cap, root.reply_count, pages.is_truncated());
            debug!(thread = %root.ts, replies = replies.len(), dropped, "fetched thread");
            (Replies::Loaded { replies, dropped }, received)
        }
        Err(e) => {
            warn!(thread = %root.ts, error = %e, "could not fetch thread replies");
            (
                Replies::Unavailable {
                    reason: e.to_string(),
                },
                pages.yielded(),
            )
        }
    }
}

/// Sort replies ascending, keep the oldest `cap`, and count what was left
/// out. A truncated walk means the API held more than it returned, so the
/// root's `reply_count` is the better total.
fn cap_replies(
    mut replies: Vec<RawRecord>,
    cap: usize,
    reply_count: usize,
    truncated: bool,
) -> (Vec<RawRecord>, usize) {
    replies.sort_by(|a, b| a.ts.cmp(&b.ts));
    let overflow = replies.len().saturating_sub(cap);
    replies.truncate(cap);
    let dropped = if overflow > 0 || truncated {
        overflow.max(reply_count.saturating_sub(replies.len()))
    } else {
        0
    };
    (replies, dropped)
}
