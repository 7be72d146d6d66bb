//! Export a Slack channel's history, thread replies included, as one
//! ordered document with every id resolved to a name.
//!
//! The pipeline is [`gateway`] (paging and rate limits) feeding
//! [`history`] (timeline plus threads), [`resolver`] and [`slack_render`]
//! (names and markup), and finally [`assemble`], which produces the
//! [`Document`]. [`export_channel`] runs all of it.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

pub mod assemble;
pub mod cli;
pub mod commands;
pub mod error;
pub mod export;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod markdown;
pub mod model;
pub mod output;
pub mod resolver;
pub mod settings;
pub mod slack;
pub mod slack_render;

pub use cli::{Cli, Commands, ExportArgs};
pub use error::{AppError, ApiFailure, GatewayError, Result, Stage};
pub use export::export_channel;
pub use gateway::{Gateway, RetryPolicy, SlackApi};
pub use model::{ChannelSpec, Document, Message};
pub use output::Format;
pub use resolver::EntityResolver;
pub use settings::Settings;
pub use slack::SlackWebApi;

pub fn load_token() -> Result<String> {
    std::env::var("SLACK_TOKEN").map_err(|_| AppError::MissingToken)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// UTC midnight starting `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Window covering whole days: from the start of `oldest` up to the start
/// of the day after `latest`.
pub fn day_window(
    oldest: Option<NaiveDate>,
    latest: Option<NaiveDate>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    if let (Some(oldest), Some(latest)) = (oldest, latest)
        && oldest > latest
    {
        return Err(AppError::InvalidDate(format!(
            "oldest {oldest} is after latest {latest}"
        )));
    }
    let latest = latest
        .map(|day| {
            day.checked_add_days(Days::new(1))
                .ok_or_else(|| AppError::InvalidDate(day.to_string()))
        })
        .transpose()?;
    Ok((oldest.map(day_start), latest.map(day_start)))
}
