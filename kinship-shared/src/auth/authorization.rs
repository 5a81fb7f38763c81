/// Family-scoped permission checks
///
/// There are two permission levels inside a family: the single owner, and
/// everyone else who belongs to it. Checks are re-run against storage on every
/// call rather than cached in the token, so a change of membership takes
/// effect on the next request.
///
/// # Example
///
/// ```no_run
/// use kinship_shared::auth::authorization::require_family_owner;
/// use kinship_shared::auth::middleware::AuthContext;
/// use kinship_shared::store::Store;
/// use uuid::Uuid;
///
/// # async fn example(store: &dyn Store, auth: &AuthContext, family_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let family = require_family_owner(store, auth, family_id).await?;
/// println!("{} may manage {}", auth.email, family.name);
/// # Ok(())
/// # }
/// ```

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::family::Family;
use crate::models::user::User;
use crate::store::{Directory, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The token names a user that no longer exists
    #[error("user not found")]
    UserNotFound,

    #[error("family {0} not found")]
    FamilyNotFound(Uuid),

    #[error("only the family owner may do this")]
    NotOwner,

    #[error("not a member of family {0}")]
    NotMember(Uuid),

    /// The caller has not joined or created any family yet
    #[error("you do not belong to a family")]
    NoFamily,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loads the caller's user record.
pub async fn require_user<D>(directory: &D, auth: &AuthContext) -> Result<User, AuthzError>
where
    D: Directory + ?Sized,
{
    directory
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or(AuthzError::UserNotFound)
}

/// The family the caller belongs to.
pub fn require_family(user: &User) -> Result<Uuid, AuthzError> {
    user.family_id.ok_or(AuthzError::NoFamily)
}

/// Loads the family and checks that the caller owns it.
pub async fn require_family_owner<D>(
    directory: &D,
    auth: &AuthContext,
    family_id: Uuid,
) -> Result<Family, AuthzError>
where
    D: Directory + ?Sized,
{
    let family = directory
        .find_family_by_id(family_id)
        .await?
        .ok_or(AuthzError::FamilyNotFound(family_id))?;

    if !family.is_owned_by(auth.user_id) {
        return Err(AuthzError::NotOwner);
    }
    Ok(family)
}

/// Loads the family and checks that the caller belongs to it.
pub async fn require_family_member<D>(
    directory: &D,
    auth: &AuthContext,
    family_id: Uuid,
) -> Result<(Family, User), AuthzError>
where
    D: Directory + ?Sized,
{
    let family = directory
        .find_family_by_id(family_id)
        .await?
        .ok_or(AuthzError::FamilyNotFound(family_id))?;

    let user = require_user(directory, auth).await?;
    if !user.belongs_to(family_id) {
        return Err(AuthzError::NotMember(family_id));
    }
    Ok((family, user))
}
