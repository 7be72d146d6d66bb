//! One export run, from request to [`Document`].

use tracing::info;

use crate::assemble::assemble;
use crate::error::Result;
use crate::gateway::{Gateway, SlackApi};
use crate::history::fetch_channel_history;
use crate::model::{ChannelSpec, Document};
use crate::resolver::EntityResolver;

/// Fetch, resolve and assemble the history described by `spec`.
///
/// `Err` means nothing usable was retrieved. A document whose summary lists
/// issues ([`Document::is_partial`]) is still a valid result.
pub async fn export_channel<A: SlackApi>(
    gateway: &Gateway<A>,
    spec: &ChannelSpec,
) -> Result<Document> {
    let history = fetch_channel_history(gateway, spec).await?;
    let mut resolver = EntityResolver::new(gateway);
    let document = assemble(spec, history, &mut resolver).await?;
    info!(
        lookups = resolver.lookups(),
        partial = document.is_partial(),
        "export finished"
    );
    Ok(document)
}
