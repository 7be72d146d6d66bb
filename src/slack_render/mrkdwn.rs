//! Slack mrkdwn to neutral markdown.
//!
//! Parsing is a single left-to-right scan. At each position the first
//! construct that forms a valid span wins (code fence, inline code, `<...>`
//! token, entity, `*` / `~` / `_` span); anything that does not close is
//! copied through verbatim. Spans never cross a line break, and a styled
//! span's closing marker is searched for outside inline code and `<...>`
//! tokens, so emitted spans never overlap. Doubled markers (`**`, `~~`,
//! `__`) are already markdown and pass through untouched, which keeps the
//! conversion idempotent on its own output.

use chrono::DateTime;
use url::Url;

use super::references::SlackReferences;
use crate::model::EntityKind;

pub(super) const FENCE: &str = "```";

/// Convert mrkdwn `text`, naming mentions from `refs`.
///
/// Never fails; a non-empty input always yields a non-empty output.
pub fn render_mrkdwn(text: &str, refs: &SlackReferences) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(FENCE) {
        let after_open = &rest[start + FENCE.len()..];
        let Some(len) = after_open.find(FENCE) else {
            break;
        };
        render_lines(&rest[..start], refs, &mut out);
        push_code_block(&after_open[..len], &mut out);
        rest = &after_open[len + FENCE.len()..];
        if !rest.is_empty() && !rest.starts_with('\n') {
            out.push('\n');
        }
    }
    render_lines(rest, refs, &mut out);

    if out.trim().is_empty() && !text.trim().is_empty() {
        return text.to_string();
    }
    out
}

fn push_code_block(code: &str, out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FENCE);
    let mut code = code.strip_suffix('\n').unwrap_or(code);
    match code.split_once('\n') {
        // ```lang\n... keeps its info string on the fence line
        Some((info, body)) if is_info_string(info) => {
            out.push_str(info);
            code = body;
        }
        Some(("", body)) => code = body,
        _ => {}
    }
    out.push('\n');
    out.push_str(&unescape_entities(code));
    out.push('\n');
    out.push_str(FENCE);
}

fn is_info_string(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '#'))
}

fn render_lines(text: &str, refs: &SlackReferences, out: &mut String) {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_line(line, refs, out);
    }
}

fn render_line(line: &str, refs: &SlackReferences, out: &mut String) {
    if let Some(quoted) = line.strip_prefix("&gt;").or_else(|| line.strip_prefix('>')) {
        out.push_str("> ");
        render_line(quoted.strip_prefix(' ').unwrap_or(quoted), refs, out);
        return;
    }

    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    out.push_str(indent);
    if let Some(item) = body.strip_prefix("• ") {
        out.push_str("- ");
        render_inline(item, refs, out);
    } else if let Some(item) = body.strip_prefix("◦ ") {
        out.push_str("  - ");
        render_inline(item, refs, out);
    } else {
        render_inline(body, refs, out);
    }
}

fn render_inline(text: &str, refs: &SlackReferences, out: &mut String) {
    let mut i = 0;
    while let Some(c) = text.get(i..).and_then(|rest| rest.chars().next()) {
        let rest = &text[i..];
        let consumed = match c {
            '`' => inline_code(rest, out),
            '<' => angle_token(rest, refs, out),
            '&' => entity(rest, out),
            '*' | '~' | '_' => styled_span(text, i, c, refs, out),
            _ => None,
        };
        match consumed {
            Some(n) => i += n,
            None => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
}

fn inline_code(rest: &str, out: &mut String) -> Option<usize> {
    let len = rest.get(1..)?.find('`')?;
    if len == 0 {
        return None;
    }
    out.push('`');
    out.push_str(&unescape_entities(&rest[1..1 + len]));
    out.push('`');
    Some(len + 2)
}

fn angle_token(rest: &str, refs: &SlackReferences, out: &mut String) -> Option<usize> {
    let end = rest.find('>')?;
    let body = &rest[1..end];
    if body.is_empty() || body.contains('<') {
        return None;
    }
    out.push_str(&render_token(body, refs)?);
    Some(end + 1)
}

fn render_token(body: &str, refs: &SlackReferences) -> Option<String> {
    let (target, label) = match body.split_once('|') {
        Some((target, label)) => (target, Some(label.trim()).filter(|l| !l.is_empty())),
        None => (body, None),
    };

    if let Some(id) = target.strip_prefix('@') {
        return Some(format!("@{}", mention_name(refs, EntityKind::User, id, label)));
    }
    if let Some(id) = target.strip_prefix('#') {
        return Some(format!("#{}", mention_name(refs, EntityKind::Channel, id, label)));
    }
    if let Some(special) = target.strip_prefix('!') {
        if let Some(id) = special.strip_prefix("subteam^") {
            let label = label.map(|l| l.trim_start_matches('@'));
            return Some(format!("@{}", mention_name(refs, EntityKind::Usergroup, id, label)));
        }
        if let Some(date) = special.strip_prefix("date^") {
            return render_date(date, label);
        }
        return Some(match (special, label) {
            ("here" | "channel" | "everyone", _) => format!("@{special}"),
            (_, Some(label)) => unescape_entities(label),
            (other, None) => format!("@{other}"),
        });
    }

    let url = unescape_entities(target.trim());
    Url::parse(&url).ok()?;
    let text = label.map(unescape_entities).unwrap_or_else(|| url.clone());
    Some(format!("[{text}]({url})"))
}

fn mention_name(refs: &SlackReferences, kind: EntityKind, id: &str, label: Option<&str>) -> String {
    refs.name(kind, id)
        .map(str::to_string)
        .or_else(|| label.map(unescape_entities))
        .unwrap_or_else(|| kind.placeholder(id))
}

/// `<!date^1392734382^{date_short}|Feb 18>`: the fallback text, else the
/// UTC time.
fn render_date(spec: &str, fallback: Option<&str>) -> Option<String> {
    if let Some(fallback) = fallback {
        return Some(unescape_entities(fallback));
    }
    let secs = spec.split('^').next()?.parse::<i64>().ok()?;
    let dt = DateTime::from_timestamp(secs, 0)?;
    Some(dt.format("%Y-%m-%d %H:%M UTC").to_string())
}

fn entity(rest: &str, out: &mut String) -> Option<usize> {
    let (replacement, len) = if rest.starts_with("&amp;") {
        ('&', 5)
    } else if rest.starts_with("&lt;") {
        ('<', 4)
    } else if rest.starts_with("&gt;") {
        ('>', 4)
    } else {
        return None;
    };
    out.push(replacement);
    Some(len)
}

pub(crate) fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn styled_span(
    text: &str,
    at: usize,
    marker: char,
    refs: &SlackReferences,
    out: &mut String,
) -> Option<usize> {
    let rest = &text[at..];
    let inner_and_more = &rest[1..];

    if inner_and_more.starts_with(marker) {
        out.push(marker);
        out.push(marker);
        return Some(2);
    }
    if text[..at].chars().next_back().is_some_and(char::is_alphanumeric) {
        return None;
    }
    if inner_and_more.chars().next().is_none_or(char::is_whitespace) {
        return None;
    }

    let close = find_closing(inner_and_more, marker)?;
    let markdown_marker = match marker {
        '*' => "**",
        '~' => "~~",
        _ => "_",
    };
    out.push_str(markdown_marker);
    render_inline(&inner_and_more[..close], refs, out);
    out.push_str(markdown_marker);
    Some(close + 2)
}

/// Byte offset of the marker closing a span whose content starts at `s`.
fn find_closing(s: &str, marker: char) -> Option<usize> {
    let mut prev: Option<char> = None;
    let mut iter = s.char_indices().peekable();
    while let Some((j, c)) = iter.next() {
        match c {
            '`' | '<' => {
                let end_char = if c == '`' { '`' } else { '>' };
                if let Some(len) = s[j + 1..].find(end_char) {
                    let skip_to = j + 1 + len;
                    while iter.peek().is_some_and(|(k, _)| *k <= skip_to) {
                        iter.next();
                    }
                    prev = Some(end_char);
                    continue;
                }
            }
            c if c == marker => {
                let after = s[j + c.len_utf8()..].chars().next();
                let closes = prev.is_some_and(|p| !p.is_whitespace())
                    && !after.is_some_and(char::is_alphanumeric)
                    && after != Some(marker);
                if closes {
                    return Some(j);
                }
            }
            _ => {}
        }
        prev = Some(c);
    }
    None
}
