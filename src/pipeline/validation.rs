//! Webhook payload validation.
//!
//! Rules are plain data: a list of fields (dotted paths into the JSON
//! payload) with the checks each must pass. Validation is a pure function
//! from payload to field errors; nothing is logged here.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Events the chat platform is known to emit.
pub const KNOWN_EVENTS: &[&str] = &[
    "conversation_created",
    "conversation_updated",
    "conversation_status_changed",
    "conversation_typing_on",
    "conversation_typing_off",
    "message_created",
    "message_updated",
    "contact_created",
    "contact_updated",
    "webwidget_triggered",
];

const MESSAGE_TYPES: &[&str] = &["incoming", "outgoing", "activity", "template"];

/// A single check applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Field must be present and non-null.
    Required,
    String,
    Integer,
    /// Non-empty string or integer.
    Identifier,
    Object,
    Array,
    /// String drawn from a fixed set.
    OneOf(&'static [&'static str]),
    /// Maximum string length in characters.
    MaxLen(usize),
}

/// Checks for one field, addressed by dotted path (`account.id`).
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub rules: &'static [Rule],
}

/// Rule set for inbound chat-platform webhooks.
pub const WEBHOOK_RULES: &[FieldRule] = &[
    FieldRule {
        field: "event",
        rules: &[Rule::Required, Rule::String, Rule::OneOf(KNOWN_EVENTS)],
    },
    FieldRule {
        field: "id",
        rules: &[Rule::Identifier],
    },
    FieldRule {
        field: "account",
        rules: &[Rule::Object],
    },
    FieldRule {
        field: "account.id",
        rules: &[Rule::Integer],
    },
    FieldRule {
        field: "account_id",
        rules: &[Rule::Integer],
    },
    FieldRule {
        field: "conversation",
        rules: &[Rule::Object],
    },
    FieldRule {
        field: "conversation.id",
        rules: &[Rule::Integer],
    },
    FieldRule {
        field: "content",
        rules: &[Rule::String, Rule::MaxLen(65_535)],
    },
    FieldRule {
        field: "message_type",
        rules: &[Rule::OneOf(MESSAGE_TYPES)],
    },
    FieldRule {
        field: "sender",
        rules: &[Rule::Object],
    },
    FieldRule {
        field: "sender.name",
        rules: &[Rule::String, Rule::MaxLen(255)],
    },
    FieldRule {
        field: "attachments",
        rules: &[Rule::Array],
    },
    FieldRule {
        field: "created_at",
        rules: &[Rule::String],
    },
];

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate `payload` against `rules`, collecting every failure.
///
/// Optional fields that are absent or null are skipped.
pub fn validate(payload: &Value, rules: &[FieldRule]) -> Result<(), Vec<FieldError>> {
    if !payload.is_object() {
        return Err(vec![FieldError::new("payload", "must be a JSON object")]);
    }

    let mut errors = Vec::new();
    for field_rule in rules {
        let value = lookup(payload, field_rule.field).filter(|v| !v.is_null());
        let Some(value) = value else {
            if field_rule.rules.contains(&Rule::Required) {
                errors.push(FieldError::new(field_rule.field, "is required"));
            }
            continue;
        };

        for rule in field_rule.rules {
            if let Some(message) = check(*rule, value) {
                errors.push(FieldError::new(field_rule.field, message));
                break;
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_webhook(payload: &Value) -> Result<(), Vec<FieldError>> {
    validate(payload, WEBHOOK_RULES)
}

/// Group errors as `{ field: [messages] }` for the error body.
pub fn to_details(errors: &[FieldError]) -> Value {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for error in errors {
        grouped.entry(&error.field).or_default().push(&error.message);
    }
    serde_json::json!(grouped)
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |value, segment| value.get(segment))
}

fn check(rule: Rule, value: &Value) -> Option<String> {
    let ok = match rule {
        Rule::Required => true,
        Rule::String => value.is_string(),
        Rule::Integer => value.is_i64() || value.is_u64(),
        Rule::Identifier => match value {
            Value::String(s) => !s.is_empty(),
            other => other.is_i64() || other.is_u64(),
        },
        Rule::Object => value.is_object(),
        Rule::Array => value.is_array(),
        Rule::OneOf(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
        Rule::MaxLen(max) => value.as_str().map_or(true, |s| s.chars().count() <= max),
    };
    if ok {
        return None;
    }

    Some(match rule {
        Rule::Required => "is required".to_string(),
        Rule::String => "must be a string".to_string(),
        Rule::Integer => "must be an integer".to_string(),
        Rule::Identifier => "must be a non-empty string or integer".to_string(),
        Rule::Object => "must be an object".to_string(),
        Rule::Array => "must be an array".to_string(),
        Rule::OneOf(allowed) => format!("must be one of: {}", allowed.join(", ")),
        Rule::MaxLen(max) => format!("must be at most {max} characters"),
    })
}
