use serde::Serialize;
use serde_json::Value;
use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::*;

use crate::error::{ApiFailure, AppError, Result};
use crate::gateway::{Endpoint, ListParams, Page, SlackApi};
use crate::model::{EntityKind, RawRecord, Ts};

/// [`SlackApi`] backed by the Slack Web API through slack-morphism.
pub struct SlackWebApi {
    client: SlackHyperClient,
    token: SlackApiToken,
}

impl SlackWebApi {
    pub fn new(token: &str) -> Result<Self> {
        let connector =
            SlackClientHyperConnector::new().map_err(|e| AppError::SlackApi(e.to_string()))?;
        Ok(SlackWebApi {
            client: SlackClient::new(connector),
            token: SlackApiToken::new(SlackApiTokenValue(token.to_string())),
        })
    }
}

impl SlackApi for SlackWebApi {
    async fn list_page(
        &self,
        endpoint: Endpoint,
        params: &ListParams,
        cursor: Option<&str>,
        limit: u16,
    ) -> std::result::Result<Page, ApiFailure> {
        let session = self.client.open_session(&self.token);
        let channel = SlackChannelId(params.channel.clone());
        let cursor = cursor.map(|c| SlackCursorId(c.to_string()));
        let oldest = params.oldest.as_ref().map(to_slack_ts);
        let latest = params.latest.as_ref().map(to_slack_ts);

        let (messages, metadata) = match endpoint {
            Endpoint::ConversationsHistory => {
                let request = SlackApiConversationsHistoryRequest::new()
                    .with_channel(channel)
                    .with_limit(limit)
                    .opt_oldest(oldest)
                    .opt_latest(latest)
                    .opt_cursor(cursor);
                let response = session
                    .conversations_history(&request)
                    .await
                    .map_err(classify_error)?;
                (response.messages, response.response_metadata)
            }
            Endpoint::ConversationsReplies => {
                let thread_ts = params.thread_ts.as_ref().ok_or_else(|| ApiFailure::Api {
                    code: "thread_ts_missing".to_string(),
                })?;
                let request =
                    SlackApiConversationsRepliesRequest::new(channel, to_slack_ts(thread_ts))
                        .with_limit(limit)
                        .opt_oldest(oldest)
                        .opt_latest(latest)
                        .opt_cursor(cursor);
                let response = session
                    .conversations_replies(&request)
                    .await
                    .map_err(classify_error)?;
                (response.messages, response.response_metadata)
            }
        };

        let records = messages
            .iter()
            .map(|message| {
                to_json(message).and_then(|value| {
                    RawRecord::from_json(value).map_err(|e| ApiFailure::Decode(e.to_string()))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let next_cursor = metadata
            .and_then(|meta| meta.next_cursor)
            .map(|cursor| cursor.0)
            .filter(|cursor| !cursor.is_empty());

        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn lookup(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> std::result::Result<Option<String>, ApiFailure> {
        let session = self.client.open_session(&self.token);
        let entity = match kind {
            EntityKind::User => session
                .users_info(&SlackApiUsersInfoRequest::new(SlackUserId(id.to_string())))
                .await
                .map_err(classify_error)
                .and_then(|response| to_json(&response.user)),
            EntityKind::Channel => session
                .conversations_info(&SlackApiConversationsInfoRequest::new(SlackChannelId(
                    id.to_string(),
                )))
                .await
                .map_err(classify_error)
                .and_then(|response| to_json(&response.channel)),
            EntityKind::Usergroup => session
                .usergroups_list(&SlackApiUserGroupsListRequest::new())
                .await
                .map_err(classify_error)
                .and_then(|response| to_json(&response.usergroups))
                .map(|groups| find_by_id(groups, id)),
            EntityKind::Bot => session
                .bots_info(&SlackApiBotsInfoRequest::new().with_bot(id.to_string()))
                .await
                .map_err(classify_error)
                .and_then(|response| to_json(&response.bot)),
        };

        match entity {
            Ok(value) => Ok(display_name(kind, &value)),
            Err(ApiFailure::NotFound { .. }) => Ok(None),
            Err(failure) => Err(failure),
        }
    }
}

fn classify_error(err: SlackClientError) -> ApiFailure {
    match err {
        SlackClientError::RateLimitError(e) => ApiFailure::RateLimited {
            retry_after: e.retry_after,
        },
        SlackClientError::ApiError(e) => ApiFailure::from_code(&e.code),
        other => ApiFailure::Transport(other.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<Value, ApiFailure> {
    serde_json::to_value(value).map_err(|e| ApiFailure::Decode(e.to_string()))
}

fn find_by_id(entities: Value, id: &str) -> Value {
    entities
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .find(|item| item.get("id").and_then(Value::as_str) == Some(id))
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn non_empty_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Pick the human-readable name out of an entity's JSON.
pub fn display_name(kind: EntityKind, entity: &Value) -> Option<String> {
    let candidates: &[&[&str]] = match kind {
        EntityKind::User => &[
            &["profile", "display_name"],
            &["profile", "real_name"],
            &["real_name"],
            &["name"],
        ],
        EntityKind::Channel | EntityKind::Bot => &[&["name"]],
        EntityKind::Usergroup => &[&["handle"], &["name"]],
    };
    candidates
        .iter()
        .find_map(|path| non_empty_str(entity, path))
        .map(str::to_string)
}

fn to_slack_ts(ts: &Ts) -> SlackTs {
    SlackTs(ts.as_str().to_string())
}
