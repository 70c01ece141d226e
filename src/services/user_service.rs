use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder, QuerySelect};

use crate::{
    dto::users::UserList,
    entity::{Users, users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, viewer_id},
    models::UserProfile,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::follow_service::followed_among,
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    viewer: Option<&AuthUser>,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    let page = pagination.normalize();
    let finder = Users::find()
        .order_by_asc(users::Column::Username)
        .order_by_asc(users::Column::Id);
    let total = finder.clone().count(&state.orm).await? as i64;
    let models = finder
        .limit(page.per_page as u64)
        .offset(page.offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<i64> = models.iter().map(|u| u.id).collect();
    let followed = followed_among(&state.orm, viewer_id(viewer), &ids).await?;
    let items = models
        .into_iter()
        .map(|u| {
            let is_subscribed = followed.contains(&u.id);
            UserProfile::from_entity(u, is_subscribed)
        })
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::for_page(&page, total)),
    ))
}

pub async fn get_user(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: i64,
) -> AppResult<ApiResponse<UserProfile>> {
    let user = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let followed = followed_among(&state.orm, viewer_id(viewer), &[user.id]).await?;
    let is_subscribed = followed.contains(&user.id);
    Ok(ApiResponse::success(
        "User",
        UserProfile::from_entity(user, is_subscribed),
        None,
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<UserProfile>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(ApiResponse::success(
        "Current user",
        UserProfile::from_entity(model, false),
        None,
    ))
}
