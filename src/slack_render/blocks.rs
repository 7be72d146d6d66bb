//! Block Kit JSON to neutral markdown, for messages whose `text` is empty.

use serde_json::Value;

use super::mrkdwn::render_mrkdwn;
use super::references::SlackReferences;
use crate::model::EntityKind;

pub fn render_blocks_as_markdown(blocks: &[Value], refs: &SlackReferences) -> String {
    blocks
        .iter()
        .filter_map(|block| render_block(block, refs))
        .filter(|rendered| !rendered.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_block(block: &Value, refs: &SlackReferences) -> Option<String> {
    match block.get("type").and_then(Value::as_str)? {
        "rich_text" => Some(render_rich_text_block(block, refs)),
        "section" => {
            let mut parts: Vec<String> = block
                .get("text")
                .and_then(|t| render_text_object(t, refs))
                .into_iter()
                .collect();
            if let Some(Value::Array(fields)) = block.get("fields") {
                parts.extend(fields.iter().filter_map(|f| render_text_object(f, refs)));
            }
            Some(parts.join("\n"))
        }
        "header" => block
            .get("text")
            .and_then(|t| render_text_object(t, refs))
            .map(|text| format!("## {text}")),
        "context" => {
            let Some(Value::Array(elements)) = block.get("elements") else {
                return None;
            };
            Some(
                elements
                    .iter()
                    .filter_map(|e| render_text_object(e, refs))
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }
        "divider" => Some("---".to_string()),
        _ => None,
    }
}

fn render_text_object(text: &Value, refs: &SlackReferences) -> Option<String> {
    let body = text.get("text").and_then(Value::as_str)?;
    match text.get("type").and_then(Value::as_str) {
        Some("mrkdwn") => Some(render_mrkdwn(body, refs)),
        Some("plain_text") => Some(body.to_string()),
        _ => None,
    }
}

fn render_rich_text_block(block: &Value, refs: &SlackReferences) -> String {
    let Some(Value::Array(elements)) = block.get("elements") else {
        return String::new();
    };
    join_lines(
        elements
            .iter()
            .map(|element| render_rich_text_element(element, refs))
            .collect(),
    )
}

fn render_rich_text_element(element: &Value, refs: &SlackReferences) -> String {
    let Some(Value::Array(children)) = element.get("elements") else {
        return String::new();
    };
    match element.get("type").and_then(Value::as_str) {
        Some("rich_text_section") => render_section(children, refs),
        Some("rich_text_list") => {
            let style = element.get("style").and_then(Value::as_str).unwrap_or("bullet");
            let indent = element
                .get("indent")
                .and_then(Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or_default();
            render_list(children, style, indent, refs)
        }
        Some("rich_text_preformatted") => format!("```\n{}\n```", render_section(children, refs)),
        Some("rich_text_quote") => render_section(children, refs)
            .lines()
            .map(|line| format!("> {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Render inline elements, wrapping each run of identically styled
/// elements once (`**ab**`, not `**a****b**`).
fn render_section(elements: &[Value], refs: &SlackReferences) -> String {
    let mut runs: Vec<(String, Styles)> = Vec::new();
    for element in elements {
        let (text, styles) = render_section_element(element, refs);
        if text.is_empty() {
            continue;
        }
        match runs.last_mut() {
            Some((run, last)) if *last == styles => run.push_str(&text),
            _ => runs.push((text, styles)),
        }
    }
    runs.into_iter()
        .map(|(text, styles)| styles.apply(text))
        .collect::<String>()
        .trim_end_matches('\n')
        .to_string()
}

fn render_list(items: &[Value], style: &str, indent: usize, refs: &SlackReferences) -> String {
    let (bullet, width) = if style == "ordered" { ("1.", 3) } else { ("-", 2) };
    let prefix = " ".repeat(width * indent);
    items
        .iter()
        .filter_map(|item| match item.get("elements") {
            Some(Value::Array(children)) => Some(render_section(children, refs)),
            _ => None,
        })
        .map(|item| format!("{prefix}{bullet} {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_section_element(element: &Value, refs: &SlackReferences) -> (String, Styles) {
    let styles = Styles::of(element);
    let str_field = |name: &str| element.get(name).and_then(Value::as_str);
    let mention = |kind: EntityKind, field: &str, sigil: char| {
        str_field(field).map(|id| {
            let name = refs
                .name(kind, id)
                .map(str::to_string)
                .unwrap_or_else(|| kind.placeholder(id));
            format!("{sigil}{name}")
        })
    };

    let rendered = match element.get("type").and_then(Value::as_str) {
        Some("text") => str_field("text").map(str::to_string),
        Some("user") => mention(EntityKind::User, "user_id", '@'),
        Some("usergroup") => mention(EntityKind::Usergroup, "usergroup_id", '@'),
        Some("channel") => mention(EntityKind::Channel, "channel_id", '#'),
        Some("emoji") => str_field("name").map(|name| format!(":{name}:")),
        Some("broadcast") => {
            return (
                str_field("range").map(|range| format!("@{range}")).unwrap_or_default(),
                Styles::default(),
            );
        }
        Some("link") => str_field("url").map(|url| {
            let text = str_field("text").filter(|t| !t.is_empty()).unwrap_or(url);
            format!("[{text}]({url})")
        }),
        _ => None,
    };
    (rendered.unwrap_or_default(), styles)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Styles {
    bold: bool,
    italic: bool,
    strike: bool,
    code: bool,
}

impl Styles {
    fn of(element: &Value) -> Styles {
        let style = element.get("style");
        let is_styled = |name: &str| {
            style
                .and_then(|s| s.get(name))
                .and_then(Value::as_bool)
                .unwrap_or_default()
        };
        Styles {
            bold: is_styled("bold"),
            italic: is_styled("italic"),
            strike: is_styled("strike"),
            code: is_styled("code"),
        }
    }

    fn apply(self, text: String) -> String {
        // code goes innermost so other markers stay outside the backticks
        [
            (self.code, "`"),
            (self.strike, "~~"),
            (self.italic, "_"),
            (self.bold, "**"),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(text, |text, (_, marker)| wrap_with_markers(text, marker))
    }
}

/// Wrap text with markers, keeping surrounding whitespace outside them
/// (`**bold** `, not `**bold **`). Whitespace-only text stays unstyled.
fn wrap_with_markers(text: String, marker: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return text;
    }
    let start = text.len() - text.trim_start().len();
    let end = start + trimmed.len();
    format!("{}{marker}{trimmed}{marker}{}", &text[..start], &text[end..])
}

/// Join rendered rich text elements, closing a quote with a blank line
/// so the next element does not continue it.
fn join_lines(texts: Vec<String>) -> String {
    let mut out = String::new();
    let mut in_quote = false;
    for (i, text) in texts.iter().enumerate() {
        let quote = text.starts_with("> ");
        if i > 0 {
            if in_quote && !quote {
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str(text);
        in_quote = quote;
    }
    out
}
