use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NotificationStatus, Role, Status};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and token issuance.
/// Canonical definition lives here in tribute-types to eliminate
/// duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Paging --

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub veteran_id: Uuid,
    pub title: String,
    pub text: String,
    pub status: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStoryRequest {
    pub veteran_id: Option<Uuid>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub status: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub veteran_id: Option<Uuid>,
    /// Filter by the submitting user.
    pub user_id: Option<Uuid>,
    pub status: Option<Status>,
    /// Restrict results to veterans the caller is an approved next-of-kin
    /// of. Requires authentication.
    #[serde(default)]
    pub review: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct SalutedResponse {
    pub saluted: bool,
}

// -- Veterans --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVeteranRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateVeteranRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VeteranQuery {
    pub name: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Next of kin --

#[derive(Debug, Default, Deserialize)]
pub struct NokQuery {
    pub veteran_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<Status>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Notifications --

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub status: Option<NotificationStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferenceRequest {
    pub story_site: Option<bool>,
    pub story_email: Option<bool>,
    pub story_mobile: Option<bool>,
    pub photo_site: Option<bool>,
    pub photo_email: Option<bool>,
    pub photo_mobile: Option<bool>,
}
