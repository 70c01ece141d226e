use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    dto::tags::{CreateTagRequest, TagList, UpdateTagRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Tag,
    response::ApiResponse,
    services::tag_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route(
            "/{id}",
            get(get_tag)
                .patch(update_tag)
                .put(update_tag)
                .delete(delete_tag),
        )
}

#[utoipa::path(
    get,
    path = "/api/tags",
    responses(
        (status = 200, description = "All tags, ordered by slug", body = ApiResponse<TagList>)
    ),
    tag = "Tags"
)]
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<ApiResponse<TagList>>> {
    let resp = tag_service::list_tags(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/tags/{id}",
    params(
        ("id" = i64, Path, description = "Tag ID")
    ),
    responses(
        (status = 200, description = "Get tag", body = ApiResponse<Tag>),
        (status = 404, description = "Tag not found")
    ),
    tag = "Tags"
)]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Tag>>> {
    let resp = tag_service::get_tag(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created", body = ApiResponse<Tag>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Tags"
)]
pub async fn create_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Tag>>)> {
    let resp = tag_service::create_tag(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/tags/{id}",
    params(
        ("id" = i64, Path, description = "Tag ID")
    ),
    request_body = UpdateTagRequest,
    responses(
        (status = 200, description = "Tag updated", body = ApiResponse<Tag>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Tag not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tags"
)]
pub async fn update_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTagRequest>,
) -> AppResult<Json<ApiResponse<Tag>>> {
    let resp = tag_service::update_tag(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/tags/{id}",
    params(
        ("id" = i64, Path, description = "Tag ID")
    ),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Tag not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tags"
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    tag_service::delete_tag(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
