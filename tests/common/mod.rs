//! In-memory Slack used by the pipeline tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json::{Value, json};
use slack_history::gateway::{Endpoint, ListParams, Page, SlackApi};
use slack_history::model::{EntityKind, RawRecord, Ts};
use slack_history::{ApiFailure, ChannelSpec, Gateway, RetryPolicy};

pub const CHANNEL: &str = "C1";

/// Timestamp `n` seconds after a fixed base.
pub fn ts(n: u64) -> String {
    format!("{}.000000", 1_700_000_000 + n)
}

pub fn record(value: Value) -> RawRecord {
    RawRecord::from_json(value).unwrap()
}

pub fn message(n: u64, user: &str, text: &str) -> RawRecord {
    record(json!({"type": "message", "ts": ts(n), "user": user, "text": text}))
}

pub fn thread_root(n: u64, user: &str, text: &str, reply_count: usize) -> RawRecord {
    record(json!({
        "type": "message",
        "ts": ts(n),
        "thread_ts": ts(n),
        "user": user,
        "text": text,
        "reply_count": reply_count
    }))
}

pub fn reply(root: u64, n: u64, user: &str, text: &str) -> RawRecord {
    record(json!({
        "type": "message",
        "ts": ts(n),
        "thread_ts": ts(root),
        "user": user,
        "text": text
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub endpoint: Endpoint,
    pub thread_ts: Option<Ts>,
    pub cursor: Option<String>,
    pub limit: u16,
}

#[derive(Default)]
struct State {
    history: Vec<RawRecord>,
    threads: HashMap<Ts, Vec<RawRecord>>,
    names: HashMap<(EntityKind, String), String>,
    failing_threads: HashMap<Ts, ApiFailure>,
    history_failure: Option<(usize, ApiFailure)>,
    rate_limits: HashMap<(Endpoint, usize), (u32, Option<Duration>)>,
    lookup_failures: HashMap<(EntityKind, String), ApiFailure>,
    unauthorized: HashSet<EntityKind>,
    calls: Vec<Call>,
    lookups: HashMap<(EntityKind, String), usize>,
}

/// A scripted Slack workspace with one channel.
#[derive(Default)]
pub struct FakeSlack {
    state: RefCell<State>,
}

impl FakeSlack {
    pub fn new() -> Self {
        FakeSlack::default().with_name(EntityKind::Channel, CHANNEL, "general")
    }

    /// Top-level messages, in any order; served newest first.
    pub fn with_history(self, records: Vec<RawRecord>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.history = records;
            state.history.sort_by(|a, b| b.ts.cmp(&a.ts));
        }
        self
    }

    /// Replies of the thread rooted at `root`; served after a root copy.
    pub fn with_thread(self, root: &RawRecord, replies: Vec<RawRecord>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let mut records = vec![root.clone()];
            records.extend(replies);
            records.sort_by(|a, b| a.ts.cmp(&b.ts));
            state.threads.insert(root.ts.clone(), records);
        }
        self
    }

    pub fn with_name(self, kind: EntityKind, id: &str, name: &str) -> Self {
        self.state
            .borrow_mut()
            .names
            .insert((kind, id.to_string()), name.to_string());
        self
    }

    pub fn with_user(self, id: &str, name: &str) -> Self {
        self.with_name(EntityKind::User, id, name)
    }

    pub fn fail_thread(self, root_ts: &str, failure: ApiFailure) -> Self {
        self.state
            .borrow_mut()
            .failing_threads
            .insert(Ts::new(root_ts), failure);
        self
    }

    /// Fail the top-level history request for page `page` (0-based).
    pub fn fail_history_page(self, page: usize, failure: ApiFailure) -> Self {
        self.state.borrow_mut().history_failure = Some((page, failure));
        self
    }

    /// Answer `times` requests for page `page` of `endpoint` with a rate
    /// limit before serving it.
    pub fn rate_limit(
        self,
        endpoint: Endpoint,
        page: usize,
        times: u32,
        retry_after: Option<Duration>,
    ) -> Self {
        self.state
            .borrow_mut()
            .rate_limits
            .insert((endpoint, page), (times, retry_after));
        self
    }

    pub fn fail_lookup(self, kind: EntityKind, id: &str, failure: ApiFailure) -> Self {
        self.state
            .borrow_mut()
            .lookup_failures
            .insert((kind, id.to_string()), failure);
        self
    }

    pub fn reject_lookups(self, kind: EntityKind) -> Self {
        self.state.borrow_mut().unauthorized.insert(kind);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn list_calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    pub fn lookup_count(&self, kind: EntityKind, id: &str) -> usize {
        self.state
            .borrow()
            .lookups
            .get(&(kind, id.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

fn in_window(record: &RawRecord, params: &ListParams) -> bool {
    params.oldest.as_ref().is_none_or(|oldest| record.ts > *oldest)
        && params.latest.as_ref().is_none_or(|latest| record.ts < *latest)
}

fn page_index(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| c.strip_prefix("page-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or_default()
}

impl SlackApi for FakeSlack {
    async fn list_page(
        &self,
        endpoint: Endpoint,
        params: &ListParams,
        cursor: Option<&str>,
        limit: u16,
    ) -> Result<Page, ApiFailure> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call {
            endpoint,
            thread_ts: params.thread_ts.clone(),
            cursor: cursor.map(str::to_owned),
            limit,
        });

        let page = page_index(cursor);
        if let Some((remaining, retry_after)) = state.rate_limits.get_mut(&(endpoint, page))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ApiFailure::RateLimited {
                retry_after: *retry_after,
            });
        }

        let records: Vec<RawRecord> = match endpoint {
            Endpoint::ConversationsHistory => {
                if params.channel != CHANNEL {
                    return Err(ApiFailure::NotFound {
                        code: "channel_not_found".to_string(),
                    });
                }
                if let Some((failing_page, failure)) = &state.history_failure
                    && *failing_page == page
                {
                    return Err(failure.clone());
                }
                state.history.clone()
            }
            Endpoint::ConversationsReplies => {
                let Some(root) = params.thread_ts.as_ref() else {
                    return Err(ApiFailure::Api {
                        code: "thread_ts_missing".to_string(),
                    });
                };
                if let Some(failure) = state.failing_threads.get(root) {
                    return Err(failure.clone());
                }
                state.threads.get(root).cloned().ok_or(ApiFailure::NotFound {
                    code: "thread_not_found".to_string(),
                })?
            }
        };

        let records: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| in_window(r, params))
            .collect();
        let size = usize::from(limit);
        let start = page * size;
        let end = (start + size).min(records.len());
        let next_cursor = (end < records.len()).then(|| format!("page-{}", page + 1));
        Ok(Page {
            records: records.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_cursor,
        })
    }

    async fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<String>, ApiFailure> {
        let mut state = self.state.borrow_mut();
        *state.lookups.entry((kind, id.to_string())).or_default() += 1;
        if state.unauthorized.contains(&kind) {
            return Err(ApiFailure::Unauthorized {
                code: "invalid_auth".to_string(),
            });
        }
        if let Some(failure) = state.lookup_failures.get(&(kind, id.to_string())) {
            return Err(failure.clone());
        }
        Ok(state.names.get(&(kind, id.to_string())).cloned())
    }
}

pub fn gateway(fake: FakeSlack) -> Gateway<FakeSlack> {
    Gateway::new(fake).with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    })
}

pub fn spec() -> ChannelSpec {
    ChannelSpec::new(CHANNEL)
}
