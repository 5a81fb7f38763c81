/// Family address endpoints
///
/// - `GET /v1/address`: the caller's family address, or `null` if unset
/// - `POST /v1/address`: owner only; `201` when created, `200` when replaced
///
/// A caller without a family gets `404 no_family`.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kinship_shared::{
    auth::middleware::AuthContext,
    models::address::{AddressFields, FamilyAddress},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 200, message = "Street is required"))]
    pub street: String,

    #[validate(length(min = 1, max = 20, message = "Number is required"))]
    pub number: String,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub block: String,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub staircase: String,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub floor: String,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub door: String,

    #[validate(length(min = 1, max = 20, message = "Postal code is required"))]
    pub postal_code: String,

    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,

    #[validate(length(min = 1, max = 100, message = "Province is required"))]
    pub province: String,

    #[validate(length(min = 1, max = 100, message = "Country is required"))]
    pub country: String,
}

impl From<AddressRequest> for AddressFields {
    fn from(req: AddressRequest) -> Self {
        AddressFields {
            street: req.street,
            number: req.number,
            block: req.block,
            staircase: req.staircase,
            floor: req.floor,
            door: req.door,
            postal_code: req.postal_code,
            city: req.city,
            province: req.province,
            country: req.country,
        }
    }
}

pub async fn get_address(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Option<FamilyAddress>>> {
    Ok(Json(state.addresses().get(&auth).await?))
}

pub async fn set_address(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddressRequest>,
) -> ApiResult<(StatusCode, Json<FamilyAddress>)> {
    req.validate()?;

    let saved = state.addresses().set(&auth, req.into()).await?;
    let status = if saved.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(saved.address)))
}
