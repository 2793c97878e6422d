//! YouTrack API response types.

use serde::Deserialize;

/// The authenticated user, from `GET /api/users/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    pub login: String,
    pub full_name: Option<String>,
}

impl CurrentUser {
    /// The name to show in status output.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.login)
    }
}
