//! The authenticated caller of a core operation and the role checks applied to it.
//!
//! Every operation that acts on behalf of someone takes a [`Principal`]
//! explicitly. Role decisions go through [`can`] so the mapping from role to
//! permission lives in one place.

use crate::entity::user::{self, Role};
use crate::error::OAuthError;

/// Identity of the account making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
}

impl From<&user::Model> for Principal {
    fn from(user: &user::Model) -> Self {
        // A disabled account keeps its stored role but must not act with it.
        let role = if user.is_revoked() {
            Role::Revoked
        } else {
            user.role()
        };
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role,
        }
    }
}

/// Things a principal may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Consent to an app and receive an authorization code for it.
    Authorize,
    /// Submit a request for a new app registration.
    RequestApp,
    /// Edit apps the principal owns.
    ManageOwnApps,
    /// Approve apps, manage users, revoke access.
    Administer,
}

pub fn can(principal: &Principal, capability: Capability) -> bool {
    match (principal.role, capability) {
        (Role::Revoked, _) => false,
        (_, Capability::Authorize) => true,
        (Role::Developer | Role::Admin, Capability::RequestApp | Capability::ManageOwnApps) => true,
        (Role::Admin, Capability::Administer) => true,
        _ => false,
    }
}

/// [`can`], failing with `Forbidden`.
pub fn require(principal: &Principal, capability: Capability) -> Result<(), OAuthError> {
    if can(principal, capability) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = principal.user_id,
            role = %principal.role,
            ?capability,
            "capability denied"
        );
        Err(OAuthError::Forbidden)
    }
}
