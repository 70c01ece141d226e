use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    dto::tags::{CreateTagRequest, TagList, UpdateTagRequest},
    entity::{
        Tags,
        tags::{ActiveModel, Column},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Tag,
    response::{ApiResponse, Meta},
    state::AppState,
    validation::validate_tag_fields,
};

const SLUG_TAKEN: &str = "A tag with this slug already exists";

pub async fn list_tags(state: &AppState) -> AppResult<ApiResponse<TagList>> {
    let items: Vec<Tag> = Tags::find()
        .order_by_asc(Column::Slug)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Tag::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Tags",
        TagList { items },
        Some(Meta::total(total)),
    ))
}

pub async fn get_tag(state: &AppState, id: i64) -> AppResult<ApiResponse<Tag>> {
    let tag = Tags::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Tag", Tag::from(tag), None))
}

pub async fn create_tag(
    state: &AppState,
    user: &AuthUser,
    payload: CreateTagRequest,
) -> AppResult<ApiResponse<Tag>> {
    ensure_admin(user)?;
    validate_tag_fields(
        Some(&payload.name),
        Some(&payload.color),
        Some(&payload.slug),
    )?;

    let tag = ActiveModel {
        id: NotSet,
        name: Set(payload.name.trim().to_string()),
        color: Set(payload.color),
        slug: Set(payload.slug),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::on_unique_violation(err, SLUG_TAKEN))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "tag_create",
        "tags",
        serde_json::json!({ "tag_id": tag.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Tag created",
        Tag::from(tag),
        Some(Meta::empty()),
    ))
}

pub async fn update_tag(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateTagRequest,
) -> AppResult<ApiResponse<Tag>> {
    ensure_admin(user)?;
    validate_tag_fields(
        payload.name.as_deref(),
        payload.color.as_deref(),
        payload.slug.as_deref(),
    )?;

    let existing = Tags::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(color) = payload.color {
        active.color = Set(color);
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    let tag = active
        .update(&state.orm)
        .await
        .map_err(|err| AppError::on_unique_violation(err, SLUG_TAKEN))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "tag_update",
        "tags",
        serde_json::json!({ "tag_id": tag.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", Tag::from(tag), Some(Meta::empty())))
}

pub async fn delete_tag(state: &AppState, user: &AuthUser, id: i64) -> AppResult<()> {
    ensure_admin(user)?;
    let result = Tags::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "tag_delete",
        "tags",
        serde_json::json!({ "tag_id": id }),
    )
    .await;
    Ok(())
}
