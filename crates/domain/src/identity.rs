use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Identity snapshot captured at authentication time. Realtime connections
/// keep this for their whole lifetime; it is not refreshed mid-session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl UserIdentity {
    pub fn with_user_id(user_id: impl Into<String>, role: Role) -> Self {
        let user_id = user_id.into();
        Self {
            email: format!("{user_id}@localhost"),
            user_id,
            role,
        }
    }
}
