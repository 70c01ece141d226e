use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    entity::{
        recipe_memberships::{self, ActiveModel as MembershipActive, Column as MembershipCol},
        RecipeMemberships, Recipes,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{ListKind, RecipeShort},
    response::{ApiResponse, Meta},
    services::recipe_service::recipe_short,
    state::AppState,
};

/// Adds a recipe to one of the user's lists.
///
/// The existence check only produces a friendly error; the unique
/// `(user_id, recipe_id, kind)` constraint decides concurrent duplicates.
pub async fn add_to_list(
    state: &AppState,
    user: &AuthUser,
    recipe_id: i64,
    kind: ListKind,
) -> AppResult<ApiResponse<RecipeShort>> {
    let existing = RecipeMemberships::find()
        .filter(MembershipCol::UserId.eq(user.user_id))
        .filter(MembershipCol::RecipeId.eq(recipe_id))
        .filter(MembershipCol::Kind.eq(kind.as_str()))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(already_listed(kind));
    }

    let recipe = Recipes::find_by_id(recipe_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    MembershipActive {
        id: NotSet,
        user_id: Set(user.user_id),
        recipe_id: Set(recipe.id),
        kind: Set(kind.as_str().to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::on_unique_violation(err, &already_listed_message(kind)))?;

    tracing::info!(user_id = user.user_id, recipe_id, kind = kind.as_str(), "recipe added to list");
    audit::record(
        &state.pool,
        Some(user.user_id),
        &format!("{}_add", kind.as_str()),
        "recipe_memberships",
        serde_json::json!({ "recipe_id": recipe_id }),
    )
    .await;

    Ok(ApiResponse::success(
        format!("Added to {}", kind.display_name()),
        recipe_short(&recipe),
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_list(
    state: &AppState,
    user: &AuthUser,
    recipe_id: i64,
    kind: ListKind,
) -> AppResult<()> {
    let result = RecipeMemberships::delete_many()
        .filter(MembershipCol::UserId.eq(user.user_id))
        .filter(MembershipCol::RecipeId.eq(recipe_id))
        .filter(MembershipCol::Kind.eq(kind.as_str()))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = user.user_id, recipe_id, kind = kind.as_str(), "recipe removed from list");
    audit::record(
        &state.pool,
        Some(user.user_id),
        &format!("{}_remove", kind.as_str()),
        "recipe_memberships",
        serde_json::json!({ "recipe_id": recipe_id }),
    )
    .await;

    Ok(())
}

/// The `(recipe_id, kind)` pairs `viewer` holds among `recipe_ids`.
pub async fn memberships_among<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    recipe_ids: &[i64],
) -> AppResult<HashSet<(i64, ListKind)>> {
    let Some(user_id) = viewer else {
        return Ok(HashSet::new());
    };
    if recipe_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(i64, String)> = RecipeMemberships::find()
        .select_only()
        .column(recipe_memberships::Column::RecipeId)
        .column(recipe_memberships::Column::Kind)
        .filter(MembershipCol::UserId.eq(user_id))
        .filter(MembershipCol::RecipeId.is_in(recipe_ids.to_vec()))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(recipe_id, kind)| ListKind::from_db(&kind).map(|k| (recipe_id, k)))
        .collect())
}

/// `(is_favorited, is_in_shopping_cart)` for one recipe; anonymous viewers
/// never hold anything.
pub fn resolve_flags(
    viewer: Option<i64>,
    memberships: &HashSet<(i64, ListKind)>,
    recipe_id: i64,
) -> (bool, bool) {
    if viewer.is_none() {
        return (false, false);
    }
    (
        memberships.contains(&(recipe_id, ListKind::Favorite)),
        memberships.contains(&(recipe_id, ListKind::ShoppingCart)),
    )
}

fn already_listed_message(kind: ListKind) -> String {
    format!("Recipe is already in {}", kind.display_name())
}

fn already_listed(kind: ListKind) -> AppError {
    AppError::AlreadyExists(already_listed_message(kind))
}
