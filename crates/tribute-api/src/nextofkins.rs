use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tribute_core::kin::{CreateNokRequest, ProofUpload, UpdateNokRequest};
use tribute_types::api::{Claims, NokQuery, RejectRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::auth_user;

pub async fn search(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<NokQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.kins.search(&query).await?;
    Ok(Json(page))
}

pub async fn get_single(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let kin = state.kins.get_single(id).await?;
    Ok(Json(kin))
}

/// The requesting user attaches proof documents; the request itself always
/// starts Pending and awaits an admin decision.
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_kin_form(multipart).await?;

    let veteran_id = form
        .veteran_id
        .ok_or_else(|| ApiError::bad_request("veteran_id is required."))?;
    let full_name = form
        .full_name
        .ok_or_else(|| ApiError::bad_request("full_name is required."))?;
    let email = form
        .email
        .ok_or_else(|| ApiError::bad_request("email is required."))?;

    let kin = state
        .kins
        .create(
            &auth_user(&claims),
            CreateNokRequest {
                // the requester becomes the kin unless an explicit user_id
                // is supplied (admin flows)
                user_id: form.user_id.unwrap_or(claims.sub),
                veteran_id,
                full_name,
                email,
            },
            form.proofs,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(kin)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_kin_form(multipart).await?;

    let kin = state
        .kins
        .update(
            &auth_user(&claims),
            id,
            UpdateNokRequest {
                full_name: form.full_name,
                email: form.email,
            },
            form.proofs,
        )
        .await?;
    Ok(Json(kin))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.kins.remove(&auth_user(&claims), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.kins.approve(&auth_user(&claims), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .kins
        .reject(&auth_user(&claims), id, &req.response)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Multipart parsing --

#[derive(Default)]
struct KinForm {
    user_id: Option<Uuid>,
    veteran_id: Option<Uuid>,
    full_name: Option<String>,
    email: Option<String>,
    proofs: Vec<ProofUpload>,
}

async fn read_kin_form(mut multipart: Multipart) -> ApiResult<KinForm> {
    let mut form = KinForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("proofs") => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Unreadable proof field: {}", e))
                })?;
                form.proofs.push(ProofUpload {
                    bytes: bytes.to_vec(),
                    mime_type,
                });
            }
            Some("user_id") => {
                let text = read_text(field).await?;
                form.user_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::bad_request("Invalid user_id."))?,
                );
            }
            Some("veteran_id") => {
                let text = read_text(field).await?;
                form.veteran_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::bad_request("Invalid veteran_id."))?,
                );
            }
            Some("full_name") => form.full_name = Some(read_text(field).await?),
            Some("email") => form.email = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable form field: {}", e)))
}
