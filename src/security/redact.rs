//! Redaction of sensitive values before they reach the logs.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "password_confirmation",
    "token",
    "access_token",
    "refresh_token",
    "api_key",
    "secret",
    "authorization",
    "cpf",
    "phone_number",
    "email",
];

const MASK: &str = "[REDACTED]";

/// Keep a short prefix of an identity, e.g. `us***` for `user-42`.
pub fn identity(value: &str) -> String {
    let prefix: String = value.chars().take(2).collect();
    format!("{prefix}***")
}

/// Mask a bearer token, keeping only the token id of `<id>|<secret>` tokens.
pub fn token(value: &str) -> String {
    match value.split_once('|') {
        Some((id, _)) if id.len() <= 20 => format!("{id}|***"),
        _ => "***".to_string(),
    }
}

/// Copy of `payload` with sensitive keys masked at any depth.
pub fn payload(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let masked = if is_sensitive(key) {
                        Value::String(MASK.to_string())
                    } else {
                        self::payload(value)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(self::payload).collect()),
        other => other.clone(),
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_and_token_masks() {
        assert_eq!(identity("user-42"), "us***");
        assert_eq!(identity("x"), "x***");
        assert_eq!(token("12|supersecret"), "12|***");
        assert_eq!(token("opaque-token-value"), "***");
    }

    #[test]
    fn test_nested_payload_masked() {
        let input = json!({
            "event": "contact_created",
            "sender": {"name": "Ana", "email": "ana@example.com", "phone_number": "+55"},
            "attachments": [{"token": "abc", "file_type": "image"}],
            "password": "hunter2"
        });
        let out = payload(&input);

        assert_eq!(out["event"], "contact_created");
        assert_eq!(out["sender"]["name"], "Ana");
        assert_eq!(out["sender"]["email"], MASK);
        assert_eq!(out["sender"]["phone_number"], MASK);
        assert_eq!(out["attachments"][0]["token"], MASK);
        assert_eq!(out["attachments"][0]["file_type"], "image");
        assert_eq!(out["password"], MASK);
    }
}
