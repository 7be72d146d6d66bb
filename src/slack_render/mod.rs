//! Slack message markup to neutral markdown.
//!
//! Conversion runs in two phases: the references a message mentions are
//! collected and resolved through the [`EntityResolver`], then the text is
//! rendered synchronously against the filled [`SlackReferences`].

pub mod blocks;
pub mod mrkdwn;
pub mod references;

use serde_json::Value;

pub use blocks::render_blocks_as_markdown;
pub use mrkdwn::render_mrkdwn;
pub use references::{SlackReferences, find_references_in_blocks, find_references_in_text};

use crate::error::GatewayError;
use crate::gateway::SlackApi;
use crate::model::IssueKind;
use crate::resolver::EntityResolver;

/// Rendered text plus the issues met while resolving its mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub text: String,
    pub issues: Vec<IssueKind>,
}

/// Convert a mrkdwn `text` field.
pub async fn convert<A: SlackApi>(
    text: &str,
    resolver: &mut EntityResolver<'_, A>,
) -> Result<Converted, GatewayError> {
    let mut refs = find_references_in_text(text);
    let issues = resolver.resolve_references(&mut refs).await?;
    Ok(Converted {
        text: render_mrkdwn(text, &refs),
        issues,
    })
}

/// Convert a message's Block Kit `blocks`.
pub async fn convert_blocks<A: SlackApi>(
    blocks: &[Value],
    resolver: &mut EntityResolver<'_, A>,
) -> Result<Converted, GatewayError> {
    let mut refs = find_references_in_blocks(blocks);
    let issues = resolver.resolve_references(&mut refs).await?;
    Ok(Converted {
        text: render_blocks_as_markdown(blocks, &refs),
        issues,
    })
}
