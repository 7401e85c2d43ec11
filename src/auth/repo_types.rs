use serde::{Deserialize, Serialize};

pub const CREDENTIALS: &str = "credentials";

/// Sign-in secret for an identity, keyed by the normalised email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub user_id: String,
    pub password_hash: String, // argon2 PHC string, never sent to clients
}
