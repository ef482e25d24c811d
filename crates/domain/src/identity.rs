use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: String,
    pub username: String,
}

impl ActorIdentity {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: user_id.clone(),
            username: user_id,
        }
    }
}

/// The acting user as seen by the workflow: who they are and which workflow
/// roles they hold. Recorded verbatim on every history entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowActor {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
}

impl WorkflowActor {
    pub fn new(identity: ActorIdentity, roles: Vec<String>) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username,
            roles,
        }
    }
}
