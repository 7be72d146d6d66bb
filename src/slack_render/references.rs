use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::mrkdwn::FENCE;
use crate::model::EntityKind;

/// Ids mentioned by a message, with their names once resolved.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct SlackReferences {
    pub users: HashMap<String, Option<String>>,
    pub channels: HashMap<String, Option<String>>,
    pub usergroups: HashMap<String, Option<String>>,
}

impl SlackReferences {
    pub fn new() -> SlackReferences {
        SlackReferences::default()
    }

    pub fn extend(&mut self, other: SlackReferences) {
        self.users.extend(other.users);
        self.channels.extend(other.channels);
        self.usergroups.extend(other.usergroups);
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.channels.is_empty() && self.usergroups.is_empty()
    }

    fn map(&self, kind: EntityKind) -> Option<&HashMap<String, Option<String>>> {
        match kind {
            EntityKind::User => Some(&self.users),
            EntityKind::Channel => Some(&self.channels),
            EntityKind::Usergroup => Some(&self.usergroups),
            EntityKind::Bot => None,
        }
    }

    pub fn mention(&mut self, kind: EntityKind, id: &str) {
        let map = match kind {
            EntityKind::User => &mut self.users,
            EntityKind::Channel => &mut self.channels,
            EntityKind::Usergroup => &mut self.usergroups,
            EntityKind::Bot => return,
        };
        map.entry(id.to_string()).or_insert(None);
    }

    pub fn set_name(&mut self, kind: EntityKind, id: &str, name: &str) {
        let map = match kind {
            EntityKind::User => &mut self.users,
            EntityKind::Channel => &mut self.channels,
            EntityKind::Usergroup => &mut self.usergroups,
            EntityKind::Bot => return,
        };
        map.insert(id.to_string(), Some(name.to_string()));
    }

    pub fn name(&self, kind: EntityKind, id: &str) -> Option<&str> {
        self.map(kind)?.get(id)?.as_deref()
    }

    pub(crate) fn unresolved_mut(
        &mut self,
    ) -> impl Iterator<Item = (EntityKind, &String, &mut Option<String>)> {
        let users = self.users.iter_mut().map(|(id, slot)| (EntityKind::User, id, slot));
        let channels = self
            .channels
            .iter_mut()
            .map(|(id, slot)| (EntityKind::Channel, id, slot));
        let usergroups = self
            .usergroups
            .iter_mut()
            .map(|(id, slot)| (EntityKind::Usergroup, id, slot));
        users
            .chain(channels)
            .chain(usergroups)
            .filter(|(_, _, slot)| slot.is_none())
    }
}

/// Collect the user, channel and usergroup tokens of a mrkdwn text.
///
/// Code fences and inline code are skipped, since `render_mrkdwn` copies
/// them verbatim.
pub fn find_references_in_text(text: &str) -> SlackReferences {
    let mut refs = SlackReferences::new();
    let mut rest = text;
    while let Some(start) = rest.find(FENCE) {
        let after_open = &rest[start + FENCE.len()..];
        let Some(len) = after_open.find(FENCE) else {
            break;
        };
        find_outside_code(&rest[..start], &mut refs);
        rest = &after_open[len + FENCE.len()..];
    }
    find_outside_code(rest, &mut refs);
    refs
}

fn find_outside_code(text: &str, refs: &mut SlackReferences) {
    for line in text.split('\n') {
        let mut i = 0;
        while let Some(c) = line.get(i..).and_then(|rest| rest.chars().next()) {
            let rest = &line[i..];
            let consumed = match c {
                '`' => rest
                    .get(1..)
                    .and_then(|after| after.find('`'))
                    .filter(|len| *len > 0)
                    .map(|len| len + 2),
                '<' => token_body(rest).map(|body| {
                    mention_in_token(body, refs);
                    body.len() + 2
                }),
                _ => None,
            };
            i += consumed.unwrap_or(c.len_utf8());
        }
    }
}

fn token_body(rest: &str) -> Option<&str> {
    let end = rest.find('>')?;
    let body = rest.get(1..end)?;
    (!body.is_empty() && !body.contains('<')).then_some(body)
}

fn mention_in_token(body: &str, refs: &mut SlackReferences) {
    let target = body.split('|').next().unwrap_or_default();
    if let Some(id) = target.strip_prefix('@') {
        refs.mention(EntityKind::User, id);
    } else if let Some(id) = target.strip_prefix('#') {
        refs.mention(EntityKind::Channel, id);
    } else if let Some(id) = target.strip_prefix("!subteam^") {
        refs.mention(EntityKind::Usergroup, id);
    }
}

/// Collect mentions held in `rich_text` elements and in the mrkdwn text
/// objects of `section`, `header` and `context` blocks.
pub fn find_references_in_blocks(blocks: &[Value]) -> SlackReferences {
    let mut refs = SlackReferences::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("rich_text") => find_in_rich_text_elements(block, &mut refs),
            Some("section") => {
                let fields = block.get("fields").and_then(Value::as_array);
                block
                    .get("text")
                    .into_iter()
                    .chain(fields.into_iter().flatten())
                    .for_each(|text| find_in_text_object(text, &mut refs));
            }
            Some("header") => {
                if let Some(text) = block.get("text") {
                    find_in_text_object(text, &mut refs);
                }
            }
            Some("context") => {
                if let Some(elements) = block.get("elements").and_then(Value::as_array) {
                    elements
                        .iter()
                        .for_each(|element| find_in_text_object(element, &mut refs));
                }
            }
            _ => {}
        }
    }
    refs
}

fn find_in_text_object(text: &Value, refs: &mut SlackReferences) {
    if text.get("type").and_then(Value::as_str) != Some("mrkdwn") {
        return;
    }
    if let Some(body) = text.get("text").and_then(Value::as_str) {
        refs.extend(find_references_in_text(body));
    }
}

fn find_in_rich_text_elements(container: &Value, refs: &mut SlackReferences) {
    let Some(Value::Array(elements)) = container.get("elements") else {
        return;
    };
    for element in elements {
        let id_field = match element.get("type").and_then(Value::as_str) {
            Some("user") => Some((EntityKind::User, "user_id")),
            Some("channel") => Some((EntityKind::Channel, "channel_id")),
            Some("usergroup") => Some((EntityKind::Usergroup, "usergroup_id")),
            _ => None,
        };
        match id_field {
            Some((kind, field)) => {
                if let Some(id) = element.get(field).and_then(Value::as_str) {
                    refs.mention(kind, id);
                }
            }
            None => find_in_rich_text_elements(element, refs),
        }
    }
}
