use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use tribute_db::models::VeteranRow;
use tribute_types::api::{
    Claims, CreateVeteranRequest, Paged, UpdateVeteranRequest, VeteranQuery,
};
use tribute_types::models::{Role, Veteran};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

fn gate_admin(claims: &Claims) -> ApiResult<()> {
    if claims.role != Role::Admin {
        return Err(ApiError::forbidden(
            "You are not allowed to perform this action!",
        ));
    }
    Ok(())
}

fn to_veteran(row: VeteranRow) -> Veteran {
    Veteran {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt veteran id '{}': {}", row.id, e);
            Uuid::default()
        }),
        name: row.name,
        created_at: row
            .created_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| ndt.and_utc())
            })
            .unwrap_or_else(|e| {
                warn!("Corrupt created_at on veteran '{}': {}", row.id, e);
                chrono::DateTime::default()
            }),
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<VeteranQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let (rows, total) = state
        .db
        .search_veterans(query.name.as_deref(), limit, offset)?;

    Ok(Json(Paged {
        items: rows.into_iter().map(to_veteran).collect::<Vec<_>>(),
        total,
        limit,
        offset,
    }))
}

pub async fn get_single(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .db
        .get_veteran(&id.to_string())?
        .ok_or_else(|| ApiError::not_found(format!("Veteran with id: {} does not exist!", id)))?;
    Ok(Json(to_veteran(row)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateVeteranRequest>,
) -> ApiResult<impl IntoResponse> {
    gate_admin(&claims)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Veteran name is required."));
    }

    let id = Uuid::new_v4();
    state.db.insert_veteran(&id.to_string(), &req.name)?;

    let row = state
        .db
        .get_veteran(&id.to_string())?
        .ok_or_else(|| ApiError::not_found(format!("Veteran with id: {} does not exist!", id)))?;
    Ok((StatusCode::CREATED, Json(to_veteran(row))))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVeteranRequest>,
) -> ApiResult<impl IntoResponse> {
    gate_admin(&claims)?;

    if !state.db.update_veteran(&id.to_string(), req.name.as_deref())? {
        return Err(ApiError::not_found(format!(
            "Veteran with id: {} does not exist!",
            id
        )));
    }

    let row = state
        .db
        .get_veteran(&id.to_string())?
        .ok_or_else(|| ApiError::not_found(format!("Veteran with id: {} does not exist!", id)))?;
    Ok(Json(to_veteran(row)))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    gate_admin(&claims)?;

    if !state.db.delete_veteran(&id.to_string())? {
        return Err(ApiError::not_found(format!(
            "Veteran with id: {} does not exist!",
            id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
