use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one training run: `<unix_seconds>-<feature>-<short uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub String);

impl ExperimentId {
    #[must_use]
    pub fn new(feature: &str) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}-{}", Utc::now().timestamp(), sanitize(feature), &uuid[..8]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Keeps ids usable as directory names.
fn sanitize(tag: &str) -> String {
    let cleaned: String =
        tag.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if cleaned.is_empty() { "run".to_string() } else { cleaned }
}
