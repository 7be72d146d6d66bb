//! Paginated, rate-limit aware access to the Slack Web API.
//!
//! Everything above this module goes through [`Gateway`]: list endpoints are
//! drained page by page through [`Pages`], single entities are looked up with
//! [`Gateway::lookup`]. Only one request is in flight at a time; the only
//! suspension besides the request itself is the backoff sleep after a
//! rate-limit response.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ApiFailure, GatewayError};
use crate::model::{EntityKind, RawRecord, SLACK_PAGE_CEILING, Ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ConversationsHistory,
    ConversationsReplies,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::ConversationsHistory => "conversations.history",
            Endpoint::ConversationsReplies => "conversations.replies",
        }
    }
}

/// Slack method used to look up one entity of `kind`.
pub fn lookup_endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "users.info",
        EntityKind::Channel => "conversations.info",
        EntityKind::Usergroup => "usergroups.list",
        EntityKind::Bot => "bots.info",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub channel: String,
    /// Thread root, for `conversations.replies`.
    pub thread_ts: Option<Ts>,
    pub oldest: Option<Ts>,
    pub latest: Option<Ts>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<String>,
}

/// The remote side of the gateway.
#[allow(async_fn_in_trait)]
pub trait SlackApi {
    async fn list_page(
        &self,
        endpoint: Endpoint,
        params: &ListParams,
        cursor: Option<&str>,
        limit: u16,
    ) -> Result<Page, ApiFailure>;

    /// `Ok(None)` when the entity does not exist.
    async fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<String>, ApiFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based). A server hint is used
    /// as is; otherwise the delay doubles per attempt up to `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after {
            return retry_after;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2_u32.pow(exponent))
            .min(self.max_delay)
    }
}

pub struct Gateway<A> {
    api: A,
    retry: RetryPolicy,
}

impl<A: SlackApi> Gateway<A> {
    pub fn new(api: A) -> Self {
        Gateway {
            api,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Lazily walk every page of `endpoint`, stopping after `max_items`
    /// records when a cap is given.
    pub fn fetch_pages(
        &self,
        endpoint: Endpoint,
        params: ListParams,
        page_limit: u16,
        max_items: Option<usize>,
    ) -> Pages<'_, A> {
        Pages {
            gateway: self,
            endpoint,
            params,
            page_limit: page_limit.clamp(1, SLACK_PAGE_CEILING),
            max_items,
            cursor: None,
            pages: 0,
            yielded: 0,
            dropped: 0,
            truncated: false,
            done: max_items == Some(0),
        }
    }

    pub async fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<String>, GatewayError> {
        let api = &self.api;
        self.call_with_retry(lookup_endpoint(kind), None, move || api.lookup(kind, id))
            .await
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        endpoint: &'static str,
        cursor: Option<&str>,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiFailure>>,
    {
        let mut retries = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(ApiFailure::RateLimited { retry_after }) => {
                    if retries >= self.retry.max_retries {
                        return Err(GatewayError::RateLimitExhausted {
                            endpoint,
                            cursor: cursor.map(str::to_owned),
                            attempts: retries + 1,
                        });
                    }
                    retries += 1;
                    let wait = self.retry.delay(retries, retry_after);
                    warn!(endpoint, retry = retries, ?wait, "rate limited, backing off");
                    tokio::time::sleep(wait).await;
                }
                Err(failure) => {
                    return Err(GatewayError::Request {
                        endpoint,
                        cursor: cursor.map(str::to_owned),
                        failure,
                    });
                }
            }
        }
    }
}

/// Forward-only page stream over one list endpoint. Dropping it mid-way is
/// harmless: no cursor outlives it.
pub struct Pages<'g, A> {
    gateway: &'g Gateway<A>,
    endpoint: Endpoint,
    params: ListParams,
    page_limit: u16,
    max_items: Option<usize>,
    cursor: Option<String>,
    pages: usize,
    yielded: usize,
    dropped: usize,
    truncated: bool,
    done: bool,
}

impl<A: SlackApi> Pages<'_, A> {
    /// Fetch the next page, or `None` once the endpoint or the cap is
    /// exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>, GatewayError> {
        if self.done {
            return Ok(None);
        }

        let gateway = self.gateway;
        let endpoint = self.endpoint;
        let params = &self.params;
        let cursor = self.cursor.as_deref();
        let limit = self.page_limit;
        let page = gateway
            .call_with_retry(endpoint.name(), cursor, move || {
                gateway.api.list_page(endpoint, params, cursor, limit)
            })
            .await?;

        self.pages += 1;
        let mut records = page.records;
        let next_cursor = page.next_cursor.filter(|c| !c.is_empty());

        if let Some(max) = self.max_items {
            let remaining = max.saturating_sub(self.yielded);
            if records.len() > remaining {
                self.dropped += records.len() - remaining;
                records.truncate(remaining);
                self.truncated = true;
                self.done = true;
            } else if records.len() == remaining {
                self.truncated = next_cursor.is_some();
                self.done = true;
            }
        }
        self.yielded += records.len();

        match next_cursor {
            Some(next) if !self.done => self.cursor = Some(next),
            _ => self.done = true,
        }

        debug!(
            endpoint = endpoint.name(),
            page = self.pages,
            records = records.len(),
            total = self.yielded,
            "fetched page"
        );
        Ok(Some(records))
    }

    /// Drain every remaining page into one vector.
    pub async fn collect_all(&mut self) -> Result<Vec<RawRecord>, GatewayError> {
        let mut all = Vec::new();
        while let Some(records) = self.next_page().await? {
            all.extend(records);
        }
        Ok(all)
    }

    /// Cursor of the next page to request; the last successful progress point.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Records received past the cap and discarded.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The cap stopped the walk while more data existed.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_honors_server_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay(3, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay(1, None), Duration::from_millis(500));
        assert_eq!(policy.delay(2, None), Duration::from_secs(1));
        assert_eq!(policy.delay(3, None), Duration::from_secs(2));
        assert_eq!(policy.delay(4, None), Duration::from_secs(3));
        assert_eq!(policy.delay(30, None), Duration::from_secs(3));
    }

    #[test]
    fn test_endpoint_names() {
        assert_eq!(Endpoint::ConversationsHistory.name(), "conversations.history");
        assert_eq!(lookup_endpoint(EntityKind::Usergroup), "usergroups.list");
    }
}
