use std::path::Path;

use tracing::info;

use crate::cli::ExportArgs;
use crate::error::Result;
use crate::export::export_channel;
use crate::gateway::Gateway;
use crate::model::{ChannelSpec, Document};
use crate::output::write_document;
use crate::settings::ExportSettings;
use crate::slack::SlackWebApi;
use crate::{day_window, load_token, parse_date};

/// Build the request from CLI flags, falling back to settings.
pub fn channel_spec(args: &ExportArgs, settings: &ExportSettings) -> Result<ChannelSpec> {
    let oldest = args.oldest.as_deref().map(parse_date).transpose()?;
    let latest = args.latest.as_deref().map(parse_date).transpose()?;
    let (oldest, latest) = day_window(oldest, latest)?;

    Ok(ChannelSpec::new(args.channel.clone())
        .with_oldest(oldest)
        .with_latest(latest)
        .with_max_messages(args.max_messages.unwrap_or(settings.max_messages))
        .with_max_messages_per_thread(
            args.max_thread_messages
                .unwrap_or(settings.max_thread_messages),
        )
        .with_page_size(args.page_size.unwrap_or(settings.page_size)))
}

pub async fn run_export(args: &ExportArgs, settings: &ExportSettings) -> Result<()> {
    let token = load_token()?;
    let spec = channel_spec(args, settings)?;

    // rustls needs a process-wide crypto provider before the first request;
    // a second install attempt only reports that one is already set
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let gateway =
        Gateway::new(SlackWebApi::new(&token)?).with_retry_policy(settings.retry_policy());

    eprintln!("Exporting channel {}...", spec.channel_id);
    let document = export_channel(&gateway, &spec).await?;
    write_document(&document, args.format, args.output.as_deref())?;

    report(&document, args.output.as_deref());
    Ok(())
}

fn report(document: &Document, output: Option<&Path>) {
    let summary = &document.summary;
    info!(
        messages = summary.total_after_cap,
        dropped_messages = summary.dropped_messages,
        dropped_replies = summary.dropped_replies,
        "export written"
    );
    let target = output.map_or_else(|| "stdout".to_string(), |p| p.display().to_string());
    eprintln!(
        "Export completed! {} messages from #{} written to {}.",
        summary.total_after_cap, document.channel_name, target
    );
    if document.is_partial() {
        eprintln!(
            "Partial export: {} issue(s), see the summary for details.",
            summary.issues.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Format;

    fn args(channel: &str) -> ExportArgs {
        ExportArgs {
            channel: channel.to_string(),
            oldest: None,
            latest: None,
            max_messages: None,
            max_thread_messages: None,
            page_size: None,
            format: Format::Json,
            output: None,
        }
    }

    #[test]
    fn test_channel_spec_uses_settings_defaults() {
        let settings = ExportSettings {
            max_messages: 42,
            max_thread_messages: 7,
            page_size: 3000,
            ..ExportSettings::default()
        };

        let spec = channel_spec(&args("C1"), &settings).unwrap();

        assert_eq!(spec.channel_id, "C1");
        assert_eq!(spec.max_messages, 42);
        assert_eq!(spec.max_messages_per_thread, 7);
        assert_eq!(spec.page_size, 1000);
        assert_eq!(spec.oldest, None);
    }

    #[test]
    fn test_channel_spec_flags_override_settings() {
        let mut cli = args("C1");
        cli.max_messages = Some(5);
        cli.max_thread_messages = Some(0);
        cli.page_size = Some(20);
        cli.oldest = Some("2024-01-15".to_string());
        cli.latest = Some("2024-01-15".to_string());

        let spec = channel_spec(&cli, &ExportSettings::default()).unwrap();

        assert_eq!(spec.max_messages, 5);
        assert_eq!(spec.max_messages_per_thread, 0);
        assert_eq!(spec.page_size, 20);
        assert_eq!(spec.oldest_ts().unwrap().as_str(), "1705276800.000000");
        assert_eq!(spec.latest_ts().unwrap().as_str(), "1705363200.000000");
    }

    #[test]
    fn test_channel_spec_rejects_bad_date() {
        let mut cli = args("C1");
        cli.oldest = Some("yesterday".to_string());

        assert!(channel_spec(&cli, &ExportSettings::default()).is_err());
    }
}
