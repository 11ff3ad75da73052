use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tribute_core::moderation::{CreatePhotoRequest, PhotoUpload, UpdatePhotoRequest};
use tribute_types::api::{
    Claims, CreateStoryRequest, PostQuery, RejectRequest, SalutedResponse, UpdateStoryRequest,
};
use tribute_types::models::{PostKind, Status};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{MaybeUser, auth_user};

/// The content kind is attached per route group as an extension, so one set
/// of handlers serves both stories and photos.
pub async fn search(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(MaybeUser(claims)): Extension<MaybeUser>,
    Query(query): Query<PostQuery>,
) -> ApiResult<impl IntoResponse> {
    let viewer = claims.as_ref().map(auth_user);
    let page = state.posts.search(kind, viewer.as_ref(), &query).await?;
    Ok(Json(page))
}

pub async fn get_single(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let post = state.posts.get_single(kind, id).await?;
    Ok(Json(post))
}

pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let post = state.posts.create_story(&auth_user(&claims), req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let post = state
        .posts
        .update_story(&auth_user(&claims), id, req)
        .await?;
    Ok(Json(post))
}

pub async fn create_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_photo_form(multipart).await?;

    let veteran_id = form
        .veteran_id
        .ok_or_else(|| ApiError::bad_request("veteran_id is required."))?;
    let title = form
        .title
        .ok_or_else(|| ApiError::bad_request("title is required."))?;
    let upload = form
        .upload
        .ok_or_else(|| ApiError::bad_request("A photo file is required."))?;

    let post = state
        .posts
        .create_photo(
            &auth_user(&claims),
            CreatePhotoRequest {
                veteran_id,
                title,
                status: form.status,
            },
            upload,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_photo_form(multipart).await?;

    let post = state
        .posts
        .update_photo(
            &auth_user(&claims),
            id,
            UpdatePhotoRequest {
                veteran_id: form.veteran_id,
                title: form.title,
                status: form.status,
            },
            form.upload,
        )
        .await?;
    Ok(Json(post))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.posts.approve(kind, id, &auth_user(&claims)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .posts
        .reject(kind, id, &auth_user(&claims), &req.response)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn salute(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.posts.salute(kind, id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn is_saluted(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(MaybeUser(claims)): Extension<MaybeUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let saluted = state
        .posts
        .is_saluted(kind, id, claims.map(|c| c.sub))
        .await?;
    Ok(Json(SalutedResponse { saluted }))
}

pub async fn share(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let post = state.posts.share(kind, id).await?;
    Ok(Json(post))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(kind): Extension<PostKind>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.posts.remove(kind, id, &auth_user(&claims)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Multipart parsing --

#[derive(Default)]
struct PhotoForm {
    veteran_id: Option<Uuid>,
    title: Option<String>,
    status: Option<Status>,
    upload: Option<PhotoUpload>,
}

async fn read_photo_form(mut multipart: Multipart) -> ApiResult<PhotoForm> {
    let mut form = PhotoForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable file field: {}", e)))?;
                form.upload = Some(PhotoUpload {
                    bytes: bytes.to_vec(),
                    mime_type,
                });
            }
            Some("veteran_id") => {
                let text = read_text(field).await?;
                form.veteran_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::bad_request("Invalid veteran_id."))?,
                );
            }
            Some("title") => form.title = Some(read_text(field).await?),
            Some("status") => {
                let text = read_text(field).await?;
                form.status = Some(
                    Status::parse(&text)
                        .ok_or_else(|| ApiError::bad_request("Invalid status value."))?,
                );
            }
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
