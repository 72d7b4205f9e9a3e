//! Message rendering into webhook payloads

use serde_json::{json, Value as JsonValue};

use super::message::NotifyMessage;

/// Turns a message into the JSON body posted to the sink
pub trait Render: Send + Sync {
    fn render(&self, message: &NotifyMessage) -> JsonValue;
}

/// Interactive card layout: colored header, markdown body, context fields,
/// error block, metrics, action buttons, mentions and a footer note
#[derive(Debug, Clone, Default)]
pub struct CardRenderer;

impl CardRenderer {
    pub fn new() -> Self {
        Self
    }

    fn header(message: &NotifyMessage) -> JsonValue {
        let template = if message.recovery {
            "green"
        } else {
            message.severity.color()
        };
        json!({
            "template": template,
            "title": {"tag": "plain_text", "content": message.formatted_title()},
        })
    }

    fn field(label: &str, value: &str) -> JsonValue {
        json!({
            "is_short": true,
            "text": {"tag": "lark_md", "content": format!("**{}**\n{}", label, value)},
        })
    }

    fn elements(message: &NotifyMessage) -> Vec<JsonValue> {
        let mut elements = Vec::new();

        if !message.content.is_empty() {
            elements.push(json!({"tag": "markdown", "content": message.content}));
        }

        let mut context = vec![Self::field("Source", &message.source)];
        if let Some(task) = &message.task_name {
            context.push(Self::field("Task", task));
        }
        context.push(Self::field("Time", &message.formatted_timestamp()));
        elements.push(json!({"tag": "div", "fields": context}));

        if let Some(error) = &message.error_msg {
            elements.push(json!({"tag": "hr"}));
            elements.push(json!({
                "tag": "markdown",
                "content": format!("**Error**\n```\n{}\n```", error),
            }));
        }

        if !message.metrics.is_empty() {
            let mut lines = vec!["**Metrics**".to_string()];
            for (key, value) in &message.metrics {
                lines.push(format!("- {}: {}", key, plain(value)));
            }
            elements.push(json!({"tag": "markdown", "content": lines.join("\n")}));
        }

        if !message.extra.is_empty() {
            let fields: Vec<JsonValue> = message
                .extra
                .iter()
                .map(|(k, v)| Self::field(k, &plain(v)))
                .collect();
            elements.push(json!({"tag": "div", "fields": fields}));
        }

        if !message.links.is_empty() || !message.mentions.is_empty() || message.mention_all {
            elements.push(json!({"tag": "hr"}));
        }

        if !message.links.is_empty() {
            let mut primary_taken = false;
            let actions: Vec<JsonValue> = message
                .links
                .iter()
                .map(|link| {
                    // First non-danger button is the primary one
                    let kind = if link.is_danger {
                        "danger"
                    } else if !primary_taken {
                        primary_taken = true;
                        "primary"
                    } else {
                        "default"
                    };
                    json!({
                        "tag": "button",
                        "text": {"tag": "plain_text", "content": link.text},
                        "type": kind,
                        "url": link.url,
                    })
                })
                .collect();
            elements.push(json!({"tag": "action", "actions": actions}));
        }

        let mut at = Vec::new();
        if message.mention_all {
            at.push("<at id=all></at>".to_string());
        }
        at.extend(message.mentions.iter().map(|id| format!("<at id={}></at>", id)));
        if !at.is_empty() {
            elements.push(json!({"tag": "markdown", "content": at.join(" ")}));
        }

        let mut note = format!("from {}", message.source);
        if let Some(key) = &message.dedupe_key {
            note.push_str(&format!(" | id: {}", key));
        }
        elements.push(json!({
            "tag": "note",
            "elements": [{"tag": "plain_text", "content": note}],
        }));

        elements
    }
}

impl Render for CardRenderer {
    fn render(&self, message: &NotifyMessage) -> JsonValue {
        json!({
            "msg_type": "interactive",
            "card": {
                "config": {"wide_screen_mode": true, "enable_forward": true},
                "header": Self::header(message),
                "elements": Self::elements(message),
            },
        })
    }
}

/// Strings without their JSON quotes, everything else as JSON text
fn plain(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::message::Link;
    use crate::probe::Severity;

    fn tags(payload: &JsonValue) -> Vec<String> {
        payload["card"]["elements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["tag"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_minimal_card() {
        let msg = NotifyMessage::new(Severity::Warning, "orders", "backlog 120");
        let payload = CardRenderer::new().render(&msg);

        assert_eq!(payload["msg_type"], "interactive");
        assert_eq!(payload["card"]["header"]["template"], "yellow");
        assert_eq!(
            payload["card"]["header"]["title"]["content"],
            "⚠️ [WARNING] orders"
        );
        assert_eq!(tags(&payload), vec!["markdown", "div", "note"]);
    }

    #[test]
    fn test_full_card() {
        let msg = NotifyMessage::new(Severity::Critical, "orders", "down")
            .with_error("timeout")
            .with_metric("rows", 3)
            .with_link(Link::new("open", "https://example.com"))
            .with_link(Link::new("logs", "https://example.com/logs"))
            .with_mention_all(true)
            .with_dedupe_key("orders-down");
        let payload = CardRenderer::new().render(&msg);

        assert_eq!(payload["card"]["header"]["template"], "red");
        assert_eq!(
            tags(&payload),
            vec!["markdown", "div", "hr", "markdown", "markdown", "hr", "action", "markdown", "note"]
        );
        let actions = &payload["card"]["elements"][6]["actions"];
        assert_eq!(actions[0]["type"], "primary");
        assert_eq!(actions[1]["type"], "default");
        assert_eq!(payload["card"]["elements"][7]["content"], "<at id=all></at>");
    }

    #[test]
    fn test_recovery_is_green() {
        let payload = CardRenderer::new().render(&NotifyMessage::recovery("orders", "ok"));
        assert_eq!(payload["card"]["header"]["template"], "green");
    }
}
