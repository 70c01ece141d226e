use std::collections::{HashMap, HashSet};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    dto::users::SubscriptionList,
    entity::{
        follows::{ActiveModel as FollowActive, Column as FollowCol},
        recipes::{self, Column as RecipeCol},
        users, Follows, Recipes, Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{RecipeShort, Subscription},
    response::{ApiResponse, Meta},
    routes::params::SubscriptionQuery,
    services::recipe_service::recipe_short,
    state::AppState,
};

const ALREADY_FOLLOWING: &str = "You are already subscribed to this author";

pub fn ensure_not_self(user_id: i64, author_id: i64) -> AppResult<()> {
    if user_id == author_id {
        return Err(AppError::SelfFollow);
    }
    Ok(())
}

pub async fn follow(
    state: &AppState,
    user: &AuthUser,
    author_id: i64,
    recipes_limit: Option<u64>,
) -> AppResult<ApiResponse<Subscription>> {
    ensure_not_self(user.user_id, author_id)?;

    let existing = Follows::find()
        .filter(FollowCol::UserId.eq(user.user_id))
        .filter(FollowCol::AuthorId.eq(author_id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::AlreadyExists(ALREADY_FOLLOWING.into()));
    }

    let author = Users::find_by_id(author_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    FollowActive {
        id: NotSet,
        user_id: Set(user.user_id),
        author_id: Set(author.id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::on_unique_violation(err, ALREADY_FOLLOWING))?;

    tracing::info!(user_id = user.user_id, author_id, "subscribed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "follow",
        "follows",
        serde_json::json!({ "author_id": author_id }),
    )
    .await;

    let mut views = build_subscriptions(&state.orm, user.user_id, vec![author], recipes_limit).await?;
    let view = views
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("subscription view missing")))?;
    Ok(ApiResponse::success("Subscribed", view, Some(Meta::empty())))
}

/// Removing a subscription that does not exist is a no-op.
pub async fn unfollow(state: &AppState, user: &AuthUser, author_id: i64) -> AppResult<()> {
    Users::find_by_id(author_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let result = Follows::delete_many()
        .filter(FollowCol::UserId.eq(user.user_id))
        .filter(FollowCol::AuthorId.eq(author_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(user_id = user.user_id, author_id, "unsubscribed");
        audit::record(
            &state.pool,
            Some(user.user_id),
            "unfollow",
            "follows",
            serde_json::json!({ "author_id": author_id }),
        )
        .await;
    }
    Ok(())
}

pub async fn list_subscriptions(
    state: &AppState,
    user: &AuthUser,
    query: SubscriptionQuery,
) -> AppResult<ApiResponse<SubscriptionList>> {
    let page = query.pagination().normalize();
    let finder = Follows::find()
        .filter(FollowCol::UserId.eq(user.user_id))
        .order_by_desc(FollowCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let author_ids: Vec<i64> = finder
        .select_only()
        .column(FollowCol::AuthorId)
        .limit(page.per_page as u64)
        .offset(page.offset as u64)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let mut authors: HashMap<i64, users::Model> = Users::find()
        .filter(users::Column::Id.is_in(author_ids.clone()))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    // keep follow order
    let authors: Vec<users::Model> = author_ids
        .iter()
        .filter_map(|id| authors.remove(id))
        .collect();

    let items = build_subscriptions(&state.orm, user.user_id, authors, query.recipes_limit).await?;
    Ok(ApiResponse::success(
        "Subscriptions",
        SubscriptionList { items },
        Some(Meta::for_page(&page, total)),
    ))
}

/// Authors among `author_ids` that `viewer` follows.
pub async fn followed_among<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    author_ids: &[i64],
) -> AppResult<HashSet<i64>> {
    let Some(user_id) = viewer else {
        return Ok(HashSet::new());
    };
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let ids: Vec<i64> = Follows::find()
        .select_only()
        .column(FollowCol::AuthorId)
        .filter(FollowCol::UserId.eq(user_id))
        .filter(FollowCol::AuthorId.is_in(author_ids.to_vec()))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(ids.into_iter().collect())
}

async fn build_subscriptions<C: ConnectionTrait>(
    conn: &C,
    viewer: i64,
    authors: Vec<users::Model>,
    recipes_limit: Option<u64>,
) -> AppResult<Vec<Subscription>> {
    let author_ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
    let followed = followed_among(conn, Some(viewer), &author_ids).await?;

    let mut recipes_by_author: HashMap<i64, Vec<recipes::Model>> = HashMap::new();
    if !author_ids.is_empty() {
        let rows = Recipes::find()
            .filter(RecipeCol::AuthorId.is_in(author_ids.clone()))
            .order_by_desc(RecipeCol::CreatedAt)
            .order_by_asc(RecipeCol::Name)
            .order_by_desc(RecipeCol::Id)
            .all(conn)
            .await?;
        for recipe in rows {
            recipes_by_author.entry(recipe.author_id).or_default().push(recipe);
        }
    }

    Ok(authors
        .into_iter()
        .map(|author| {
            let recipes = recipes_by_author.remove(&author.id).unwrap_or_default();
            let is_subscribed = followed.contains(&author.id);
            subscription_view(author, is_subscribed, &recipes, recipes_limit)
        })
        .collect())
}

pub fn subscription_view(
    author: users::Model,
    is_subscribed: bool,
    recipes: &[recipes::Model],
    recipes_limit: Option<u64>,
) -> Subscription {
    // zero means no limit
    let limit = recipes_limit
        .filter(|&l| l > 0)
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(recipes.len());
    let shown: Vec<RecipeShort> = recipes.iter().take(limit).map(recipe_short).collect();
    Subscription {
        id: author.id,
        email: author.email,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed,
        recipes: shown,
        recipes_count: recipes.len() as i64,
    }
}
