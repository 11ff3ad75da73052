use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use tribute_types::api::{Claims, MarkReadRequest, NotificationQuery, UpdatePreferenceRequest};

use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.notifier.search(claims.sub, &query)?;
    Ok(Json(page))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<impl IntoResponse> {
    state.notifier.mark_read(claims.sub, &req.ids)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let pref = state.notifier.preferences(claims.sub)?;
    Ok(Json(pref))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePreferenceRequest>,
) -> ApiResult<impl IntoResponse> {
    let pref = state.notifier.update_preferences(claims.sub, &req)?;
    Ok(Json(pref))
}
