use serde::{Deserialize, Serialize};

/// The signed-in staff member, as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role name as the backend spells it (admin, doctor, nurse, ...).
    #[serde(default)]
    pub role: String,
}
