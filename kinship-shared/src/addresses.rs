//! Family address book: the single postal address of a family.
//!
//! Any member can read it; only the owner can set it.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::info;

use crate::auth::authorization::{require_family, require_family_owner, require_user, AuthzError};
use crate::auth::middleware::AuthContext;
use crate::models::address::{AddressFields, FamilyAddress};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// The caller has no family, so there is no address to talk about
    #[error("you do not belong to a family")]
    NoFamily,

    #[error("only the family owner can set the address")]
    Forbidden,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AddressError {
    pub fn kind(&self) -> &'static str {
        match self {
            AddressError::NoFamily => "no_family",
            AddressError::Forbidden => "forbidden",
            AddressError::MissingField(_) => "missing_field",
            AddressError::UserNotFound => "user_not_found",
            AddressError::Store(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AddressError::NoFamily => StatusCode::NOT_FOUND,
            AddressError::Forbidden => StatusCode::FORBIDDEN,
            AddressError::MissingField(_) => StatusCode::BAD_REQUEST,
            AddressError::UserNotFound => StatusCode::UNAUTHORIZED,
            AddressError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthzError> for AddressError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::UserNotFound => AddressError::UserNotFound,
            AuthzError::NotOwner | AuthzError::NotMember(_) => AddressError::Forbidden,
            AuthzError::NoFamily | AuthzError::FamilyNotFound(_) => AddressError::NoFamily,
            AuthzError::Store(e) => AddressError::Store(e),
        }
    }
}

pub type AddressResult<T> = Result<T, AddressError>;

/// Outcome of [`AddressBook::set`]
#[derive(Debug, Clone)]
pub struct SavedAddress {
    pub address: FamilyAddress,
    pub created: bool,
}

#[derive(Clone)]
pub struct AddressBook {
    store: Arc<dyn Store>,
}

impl AddressBook {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The address of the caller's family, `None` if it was never set.
    pub async fn get(&self, auth: &AuthContext) -> AddressResult<Option<FamilyAddress>> {
        let user = require_user(&*self.store, auth).await?;
        let family_id = require_family(&user)?;
        Ok(self.store.find_family_address(family_id).await?)
    }

    /// Creates or replaces the family address. Owner only.
    pub async fn set(&self, auth: &AuthContext, mut fields: AddressFields) -> AddressResult<SavedAddress> {
        let user = require_user(&*self.store, auth).await?;
        let family_id = require_family(&user)?;
        let family = require_family_owner(&*self.store, auth, family_id).await?;

        fields.trim();
        if let Some(field) = fields.missing_field() {
            return Err(AddressError::MissingField(field));
        }

        let (address, created) = self.store.upsert_family_address(family.id, fields).await?;
        info!(family_id = %family.id, created, "Family address saved");
        Ok(SavedAddress { address, created })
    }
}
