use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public author information rendered next to articles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorProfile {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AuthorProfile {
    /// Placeholder for authors who never hit this service with a token.
    pub fn unknown(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: None,
            display_name: None,
            updated_at: now,
        }
    }
}
