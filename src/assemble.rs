//! Turns fetched records into the ordered, fully named [`Document`].

use tracing::{debug, info};

use crate::error::{AppError, GatewayError, Result, Stage};
use crate::gateway::SlackApi;
use crate::history::{ChannelHistory, Replies};
use crate::model::{
    Attachment, ChannelSpec, Depth, Document, EntityKind, Issue, IssueKind, Message,
    RawAttachment, RawFile, RawRecord, Reaction, SharedFile, Summary,
};
use crate::resolver::EntityResolver;
use crate::slack_render::{Converted, convert, convert_blocks};

/// Author of a record with neither a user nor a bot attached.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Emit one [`Message`] per root and reply, replies right after their root.
///
/// Unknown entities and unavailable threads become [`Issue`]s in the
/// summary. Only a rejected credential during resolution aborts.
pub async fn assemble<A: SlackApi>(
    spec: &ChannelSpec,
    history: ChannelHistory,
    resolver: &mut EntityResolver<'_, A>,
) -> Result<Document> {
    let total = history.record_count();
    let mut assembler = Assembler {
        resolver,
        channel: String::new(),
        messages: Vec::with_capacity(total),
        issues: Vec::new(),
    };
    assembler
        .run(spec, &history)
        .await
        .map_err(|source| AppError::Export {
            stage: Stage::Resolution,
            messages_fetched: total,
            cursor: source.cursor().map(str::to_owned),
            source,
        })?;

    let Assembler {
        channel,
        messages,
        issues,
        ..
    } = assembler;
    let summary = Summary {
        total_fetched: history.fetched,
        total_after_cap: messages.len(),
        dropped_messages: history.dropped_messages,
        dropped_replies: history.dropped_replies,
        truncated: history.truncated,
        oldest: messages.iter().map(|m| m.timestamp).min(),
        newest: messages.iter().map(|m| m.timestamp).max(),
        issues,
    };
    info!(
        channel = %channel,
        messages = summary.total_after_cap,
        issues = summary.issues.len(),
        "document assembled"
    );

    Ok(Document {
        spec: spec.clone(),
        channel_name: channel,
        messages,
        summary,
    })
}

struct Assembler<'r, 'g, A> {
    resolver: &'r mut EntityResolver<'g, A>,
    channel: String,
    messages: Vec<Message>,
    issues: Vec<Issue>,
}

impl<A: SlackApi> Assembler<'_, '_, A> {
    async fn run(
        &mut self,
        spec: &ChannelSpec,
        history: &ChannelHistory,
    ) -> std::result::Result<(), GatewayError> {
        let channel = self
            .resolver
            .name_for(EntityKind::Channel, &spec.channel_id)
            .await?;
        self.issues.extend(channel.issue.map(|kind| Issue { ts: None, kind }));
        self.channel = channel.name;

        for fetched in &history.messages {
            let replies_unavailable = match &fetched.replies {
                Replies::Unavailable { reason } => {
                    self.issues.push(Issue {
                        ts: Some(fetched.record.ts.clone()),
                        kind: IssueKind::RepliesUnavailable {
                            reason: reason.clone(),
                        },
                    });
                    true
                }
                Replies::None | Replies::Loaded { .. } => false,
            };
            self.push(&fetched.record, Depth::Root, replies_unavailable)
                .await?;
            for reply in fetched.replies.records() {
                self.push(reply, Depth::Reply, false).await?;
            }
        }
        Ok(())
    }

    async fn push(
        &mut self,
        record: &RawRecord,
        depth: Depth,
        replies_unavailable: bool,
    ) -> std::result::Result<(), GatewayError> {
        let mut issues = Vec::new();
        let author = self.author(record, &mut issues).await?;
        let Converted {
            text,
            issues: text_issues,
        } = if record.text.trim().is_empty() && !record.blocks.is_empty() {
            convert_blocks(&record.blocks, self.resolver).await?
        } else {
            convert(&record.text, self.resolver).await?
        };
        issues.extend(text_issues);
        let mut attachments = Vec::with_capacity(record.attachments.len());
        for raw in &record.attachments {
            attachments.push(self.attachment(raw, &mut issues).await?);
        }
        self.issues.extend(issues.into_iter().map(|kind| Issue {
            ts: Some(record.ts.clone()),
            kind,
        }));

        let message = Message {
            ordinal: self.messages.len(),
            depth,
            author,
            channel: self.channel.clone(),
            ts: record.ts.clone(),
            timestamp: record.ts.to_datetime().unwrap_or_default(),
            text,
            subtype: record.subtype.clone(),
            reply_count: record.reply_count,
            replies_unavailable,
            reactions: record
                .reactions
                .iter()
                .map(|r| Reaction {
                    name: r.name.clone(),
                    count: r.count,
                })
                .collect(),
            files: record.files.iter().map(shared_file).collect(),
            attachments,
        };
        debug!(ordinal = message.ordinal, ts = %message.ts, author = %message.author, "message");
        self.messages.push(message);
        Ok(())
    }

    async fn attachment(
        &mut self,
        raw: &RawAttachment,
        issues: &mut Vec<IssueKind>,
    ) -> std::result::Result<Attachment, GatewayError> {
        let pretext = match non_blank(&raw.pretext) {
            Some(pretext) => Some(self.convert_text(pretext, issues).await?),
            None => None,
        };
        let body = non_blank(&raw.text)
            .or_else(|| non_blank(&raw.fallback))
            .unwrap_or_default();
        Ok(Attachment {
            title: non_blank(&raw.title).map(str::to_owned),
            title_link: non_blank(&raw.title_link).map(str::to_owned),
            author_name: non_blank(&raw.author_name).map(str::to_owned),
            pretext,
            text: self.convert_text(body, issues).await?,
            footer: non_blank(&raw.footer).map(str::to_owned),
        })
    }

    async fn convert_text(
        &mut self,
        text: &str,
        issues: &mut Vec<IssueKind>,
    ) -> std::result::Result<String, GatewayError> {
        let converted = convert(text, self.resolver).await?;
        issues.extend(converted.issues);
        Ok(converted.text)
    }

    /// Users resolve by id. Bots prefer the name the message was posted
    /// under, which is remembered for their later messages.
    async fn author(
        &mut self,
        record: &RawRecord,
        issues: &mut Vec<IssueKind>,
    ) -> std::result::Result<String, GatewayError> {
        let username = record.username.as_deref().filter(|u| !u.trim().is_empty());
        let (kind, id) = match (&record.user, &record.bot_id) {
            (Some(user), _) => (EntityKind::User, user),
            (None, Some(bot)) => {
                if let Some(username) = username {
                    self.resolver.prime(EntityKind::Bot, bot, username);
                    return Ok(username.to_string());
                }
                (EntityKind::Bot, bot)
            }
            (None, None) => return Ok(username.unwrap_or(UNKNOWN_AUTHOR).to_string()),
        };
        let named = self.resolver.name_for(kind, id).await?;
        issues.extend(named.issue);
        Ok(named.name)
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

fn shared_file(file: &RawFile) -> SharedFile {
    let name = [&file.title, &file.name]
        .into_iter()
        .flatten()
        .find(|n| !n.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| file.id.clone());
    SharedFile {
        name,
        url: file.permalink.clone().or_else(|| file.url_private.clone()),
    }
}
