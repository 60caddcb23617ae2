use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Equality used to reject a create whose content duplicates a live record.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContentPolicy {
    /// Every field, id included, must match.
    #[default]
    FullRecord,
    /// Match on every field except the listed ones.
    IgnoreFields { fields: Vec<String> },
    /// Only id collisions are conflicts.
    Disabled,
}

impl ContentPolicy {
    /// Stable digest of the record under this policy, `None` when duplicates are allowed.
    pub fn fingerprint(&self, record: &Value) -> Option<String> {
        let canonical = match self {
            ContentPolicy::Disabled => return None,
            ContentPolicy::FullRecord => canonical_json(record),
            ContentPolicy::IgnoreFields { fields } => {
                let mut trimmed = record.clone();
                if let Value::Object(map) = &mut trimmed {
                    for field in fields {
                        map.remove(field);
                    }
                }
                canonical_json(&trimmed)
            }
        };
        let digest = Sha256::digest(canonical.as_bytes());
        Some(
            digest
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<String>(),
        )
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        Value::String(key.clone()),
                        canonical_json(&map[key.as_str()])
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}
