use std::io::{self, Write};

use crate::model::{Attachment, Document, Message};

/// Render a document as a markdown transcript.
pub fn render_markdown(document: &Document) -> String {
    let mut out = Vec::new();
    // writing into a Vec cannot fail
    let _ = write_markdown(document, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Channel heading, one section per top-level message with its replies
/// quoted underneath, then a summary footer.
pub fn write_markdown<W: Write>(document: &Document, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "# #{}\n", document.channel_name)?;

    let roots: Vec<&Message> = document.roots().collect();
    for (idx, root) in roots.iter().enumerate() {
        write_message(writer, root)?;

        let replies = document.replies_of(root.ordinal);
        if root.replies_unavailable {
            writeln!(writer, "> ⚠️ _replies unavailable_\n")?;
        } else if !replies.is_empty() {
            for reply in replies {
                write_reply(writer, reply)?;
            }
        }

        if idx < roots.len() - 1 {
            writeln!(writer, "---\n")?;
        }
    }

    write_summary(writer, document)
}

fn header(message: &Message) -> String {
    let time = message.timestamp.format("%Y-%m-%d %H:%M");
    match &message.subtype {
        Some(subtype) => format!("**{}** · {time} · _{subtype}_", message.author),
        None => format!("**{}** · {time}", message.author),
    }
}

fn write_message<W: Write>(writer: &mut W, message: &Message) -> io::Result<()> {
    writeln!(writer, "💬 {}\n", header(message))?;
    if !message.text.is_empty() {
        writeln!(writer, "{}\n", message.text)?;
    }
    write_extras(writer, message, "")
}

fn write_reply<W: Write>(writer: &mut W, reply: &Message) -> io::Result<()> {
    writeln!(writer, "> ↳ {}", header(reply))?;
    for line in reply.text.lines() {
        if line.is_empty() {
            writeln!(writer, ">")?;
        } else {
            writeln!(writer, "> {line}")?;
        }
    }
    write_extras(writer, reply, "> ")?;
    writeln!(writer)
}

fn write_extras<W: Write>(writer: &mut W, message: &Message, prefix: &str) -> io::Result<()> {
    for attachment in &message.attachments {
        write_attachment(writer, attachment, prefix)?;
    }
    if !message.files.is_empty() {
        writeln!(writer, "{prefix}📑 Files")?;
        for file in &message.files {
            match &file.url {
                Some(url) => writeln!(writer, "{prefix}- [{}]({url})", file.name)?,
                None => writeln!(writer, "{prefix}- {}", file.name)?,
            }
        }
        if prefix.is_empty() {
            writeln!(writer)?;
        }
    }
    if !message.reactions.is_empty() {
        let reactions: Vec<String> = message
            .reactions
            .iter()
            .map(|r| format!(":{}: {}", r.name, r.count))
            .collect();
        writeln!(writer, "{prefix}{}", reactions.join("  "))?;
        if prefix.is_empty() {
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn write_attachment<W: Write>(
    writer: &mut W,
    attachment: &Attachment,
    prefix: &str,
) -> io::Result<()> {
    let mut lines: Vec<String> = Vec::new();
    if let Some(pretext) = &attachment.pretext {
        lines.extend(pretext.lines().map(str::to_owned));
    }
    match (&attachment.title, &attachment.title_link) {
        (Some(title), Some(link)) => lines.push(format!("📎 [{title}]({link})")),
        (Some(title), None) => lines.push(format!("📎 {title}")),
        (None, _) => lines.push("📎".to_string()),
    }
    if let Some(author) = &attachment.author_name {
        lines.push(format!("_{author}_"));
    }
    lines.extend(attachment.text.lines().map(str::to_owned));
    if let Some(footer) = &attachment.footer {
        lines.push(format!("_{footer}_"));
    }
    for line in lines {
        writeln!(writer, "{prefix}{line}")?;
    }
    if prefix.is_empty() {
        writeln!(writer)?;
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, document: &Document) -> io::Result<()> {
    let summary = &document.summary;
    writeln!(writer, "## Summary\n")?;
    writeln!(writer, "- messages: {}", summary.total_after_cap)?;
    writeln!(writer, "- fetched: {}", summary.total_fetched)?;
    if let (Some(oldest), Some(newest)) = (summary.oldest, summary.newest) {
        writeln!(
            writer,
            "- range: {} to {}",
            oldest.format("%Y-%m-%d %H:%M"),
            newest.format("%Y-%m-%d %H:%M")
        )?;
    }
    if summary.dropped_messages > 0 || summary.truncated {
        writeln!(
            writer,
            "- dropped messages: {}{}",
            summary.dropped_messages,
            if summary.truncated { " (capped)" } else { "" }
        )?;
    }
    if summary.dropped_replies > 0 {
        writeln!(writer, "- dropped replies: {}", summary.dropped_replies)?;
    }
    if !summary.issues.is_empty() {
        writeln!(writer, "\n### Issues\n")?;
        for issue in &summary.issues {
            writeln!(writer, "- {issue}")?;
        }
    }
    Ok(())
}
