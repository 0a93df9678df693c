//! Role-based ownership gate.
//!
//! An action on a user-owned resource names the role it requires. A principal may perform it if
//! their role level meets that requirement, or if they own the resource and the requirement is
//! no higher than the configured self-service role. Ownership never lifts a principal above that
//! ceiling, so an owner cannot perform admin-only actions on their own resources.

use tracing::{debug, instrument};

use crate::{
    auth::current_user::Principal,
    db::RoleStore,
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// Pure decision: may a principal at `principal_level` act on a resource?
///
/// `self_service_level` is `None` when no ownership override applies.
pub fn decide(principal_level: i32, is_owner: bool, required_level: i32, self_service_level: Option<i32>) -> bool {
    if principal_level >= required_level {
        return true;
    }
    is_owner && self_service_level.is_some_and(|ceiling| required_level <= ceiling)
}

/// Check that `principal` may perform `action` on a resource owned by `owner_id`.
///
/// An unknown required role denies everything.
#[instrument(skip(roles, principal, owner_id), fields(user_id = %abbrev_uuid(&principal.id), owner_id = %abbrev_uuid(&owner_id)), err)]
pub async fn authorize_owner_action(
    roles: &dyn RoleStore,
    principal: &Principal,
    owner_id: UserId,
    required_role: &str,
    self_service_role: &str,
    action: &str,
) -> Result<()> {
    let Some(required) = roles.get_by_name(required_role).await? else {
        debug!(required_role, "Required role does not exist, denying");
        return Err(Error::Forbidden {
            action: action.to_string(),
        });
    };
    let self_service_level = roles.get_by_name(self_service_role).await?.map(|role| role.level);

    let is_owner = principal.id == owner_id;
    if decide(principal.role_level, is_owner, required.level, self_service_level) {
        Ok(())
    } else {
        debug!(required_role, principal_level = principal.role_level, is_owner, "Ownership gate denied");
        Err(Error::Forbidden {
            action: action.to_string(),
        })
    }
}
