use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    dto::recipes::{CreateRecipeRequest, IngredientAmountRequest, RecipeList, UpdateRecipeRequest},
    entity::{
        ingredients,
        recipe_ingredients::{self, ActiveModel as RecipeIngredientActive},
        recipe_tags::{self, ActiveModel as RecipeTagActive},
        recipes::{ActiveModel as RecipeActive, Column as RecipeCol, Model as RecipeModel},
        tags, users, Ingredients, RecipeIngredients, RecipeTags, Recipes, Tags, Users,
    },
    error::{AppError, AppResult},
    filters::RecipeFilter,
    media::{self, DecodedImage},
    middleware::auth::{AuthUser, viewer_id},
    models::{Recipe, RecipeIngredientAmount, RecipeShort, Tag, UserProfile},
    response::{ApiResponse, Meta},
    services::{follow_service::followed_among, membership_service},
    state::AppState,
    validation::{
        RecipeScalars, into_result, validate_cooking_time, validate_recipe_links,
        validate_recipe_scalars,
    },
};

/// Newest first, then author, then name.
fn ordered(select: Select<Recipes>) -> Select<Recipes> {
    select
        .order_by_desc(RecipeCol::CreatedAt)
        .order_by_asc(RecipeCol::AuthorId)
        .order_by_asc(RecipeCol::Name)
        .order_by_desc(RecipeCol::Id)
}

pub async fn list_recipes(
    state: &AppState,
    viewer: Option<&AuthUser>,
    raw_query: Option<&str>,
) -> AppResult<ApiResponse<RecipeList>> {
    let viewer = viewer_id(viewer);
    let (filter, pagination) = RecipeFilter::from_query(raw_query)?;
    let page = pagination.normalize();

    let finder = ordered(Recipes::find().filter(filter.condition(viewer)));
    let total = finder.clone().count(&state.orm).await? as i64;
    let models = finder
        .limit(page.per_page as u64)
        .offset(page.offset as u64)
        .all(&state.orm)
        .await?;

    let items = materialize(&state.orm, viewer, models).await?;
    Ok(ApiResponse::success(
        "Recipes",
        RecipeList { items },
        Some(Meta::for_page(&page, total)),
    ))
}

pub async fn get_recipe(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: i64,
) -> AppResult<ApiResponse<Recipe>> {
    let model = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let recipe = materialize_one(&state.orm, viewer_id(viewer), model).await?;
    Ok(ApiResponse::success("Recipe", recipe, None))
}

pub async fn create_recipe(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    let mut errors = validate_recipe_links(&payload.ingredients, &payload.tags);
    validate_recipe_scalars(
        &RecipeScalars {
            name: Some(&payload.name),
            text: Some(&payload.text),
            cooking_time: Some(payload.cooking_time),
        },
        &mut errors,
    );
    let image = collect_image_error(media::decode_data_uri(&payload.image), &mut errors)?;
    errors.extend(missing_references(&state.orm, &payload.ingredients, &payload.tags).await?);
    into_result(errors)?;

    let cooking_time = validate_cooking_time(payload.cooking_time).map_err(AppError::validation)?;
    let image = image.ok_or_else(|| AppError::validation("image is required"))?;
    let image_path = media::store_image(&state.config.media_root, image).await?;

    let saved = insert_recipe(
        state,
        user,
        NewRecipe {
            name: payload.name.trim().to_string(),
            text: payload.text,
            cooking_time,
            image: image_path.clone(),
        },
        &payload.ingredients,
        &payload.tags,
    )
    .await;

    let recipe = match saved {
        Ok(recipe) => recipe,
        Err(err) => {
            media::remove_image(&state.config.media_root, &image_path).await;
            return Err(err);
        }
    };

    tracing::info!(recipe_id = recipe.id, user_id = user.user_id, "recipe created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_create",
        "recipes",
        serde_json::json!({ "recipe_id": recipe.id }),
    )
    .await;

    let recipe = materialize_one(&state.orm, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Recipe created", recipe, Some(Meta::empty())))
}

pub async fn update_recipe(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    let existing = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_author(&existing, user)?;

    let mut errors = validate_recipe_links(&payload.ingredients, &payload.tags);
    validate_recipe_scalars(
        &RecipeScalars {
            name: payload.name.as_deref(),
            text: payload.text.as_deref(),
            cooking_time: payload.cooking_time,
        },
        &mut errors,
    );
    let new_image = match payload.image.as_deref() {
        Some(uri) => collect_image_error(media::decode_data_uri(uri), &mut errors)?,
        None => None,
    };
    errors.extend(missing_references(&state.orm, &payload.ingredients, &payload.tags).await?);
    into_result(errors)?;

    let cooking_time = payload
        .cooking_time
        .map(validate_cooking_time)
        .transpose()
        .map_err(AppError::validation)?;
    let new_image_path = match new_image {
        Some(image) => Some(media::store_image(&state.config.media_root, image).await?),
        None => None,
    };
    let old_image_path = existing.image.clone();

    let changes = RecipeChanges {
        name: payload.name.map(|name| name.trim().to_string()),
        text: payload.text,
        cooking_time,
        image: new_image_path.clone(),
    };
    let saved = apply_update(state, existing, changes, &payload.ingredients, &payload.tags).await;

    let recipe = match saved {
        Ok(recipe) => recipe,
        Err(err) => {
            if let Some(path) = &new_image_path {
                media::remove_image(&state.config.media_root, path).await;
            }
            return Err(err);
        }
    };
    if new_image_path.is_some() {
        media::remove_image(&state.config.media_root, &old_image_path).await;
    }

    tracing::info!(recipe_id = recipe.id, user_id = user.user_id, "recipe updated");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_update",
        "recipes",
        serde_json::json!({ "recipe_id": recipe.id }),
    )
    .await;

    let recipe = materialize_one(&state.orm, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Updated", recipe, Some(Meta::empty())))
}

pub async fn delete_recipe(state: &AppState, user: &AuthUser, id: i64) -> AppResult<()> {
    let existing = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_author(&existing, user)?;

    let result = Recipes::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    media::remove_image(&state.config.media_root, &existing.image).await;

    tracing::info!(recipe_id = id, user_id = user.user_id, "recipe deleted");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "recipe_delete",
        "recipes",
        serde_json::json!({ "recipe_id": id }),
    )
    .await;
    Ok(())
}

struct NewRecipe {
    name: String,
    text: String,
    cooking_time: i32,
    image: String,
}

async fn insert_recipe(
    state: &AppState,
    user: &AuthUser,
    fields: NewRecipe,
    ingredients: &[IngredientAmountRequest],
    tag_ids: &[i64],
) -> AppResult<RecipeModel> {
    let txn = state.orm.begin().await?;
    let recipe = RecipeActive {
        id: NotSet,
        author_id: Set(user.user_id),
        name: Set(fields.name),
        text: Set(fields.text),
        cooking_time: Set(fields.cooking_time),
        image: Set(fields.image),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;
    replace_links(&txn, recipe.id, ingredients, tag_ids).await?;
    txn.commit().await?;
    Ok(recipe)
}

struct RecipeChanges {
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i32>,
    image: Option<String>,
}

/// Links are rewritten before the scalar fields, inside one transaction.
async fn apply_update(
    state: &AppState,
    existing: RecipeModel,
    changes: RecipeChanges,
    ingredients: &[IngredientAmountRequest],
    tag_ids: &[i64],
) -> AppResult<RecipeModel> {
    let txn = state.orm.begin().await?;
    replace_links(&txn, existing.id, ingredients, tag_ids).await?;

    let mut active: RecipeActive = existing.into();
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(text) = changes.text {
        active.text = Set(text);
    }
    if let Some(minutes) = changes.cooking_time {
        active.cooking_time = Set(minutes);
    }
    if let Some(path) = changes.image {
        active.image = Set(path);
    }
    let recipe = active.update(&txn).await?;
    txn.commit().await?;
    Ok(recipe)
}

pub fn ensure_author(recipe: &RecipeModel, user: &AuthUser) -> AppResult<()> {
    if recipe.author_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

fn collect_image_error(
    decoded: AppResult<DecodedImage>,
    errors: &mut Vec<String>,
) -> AppResult<Option<DecodedImage>> {
    match decoded {
        Ok(image) => Ok(Some(image)),
        Err(AppError::Validation(messages)) => {
            errors.extend(messages);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Messages for ingredient and tag ids that do not exist.
async fn missing_references<C: ConnectionTrait>(
    conn: &C,
    ingredients: &[IngredientAmountRequest],
    tag_ids: &[i64],
) -> AppResult<Vec<String>> {
    let mut errors = Vec::new();

    let wanted: Vec<i64> = unique(ingredients.iter().map(|i| i.id));
    if !wanted.is_empty() {
        let found: HashSet<i64> = Ingredients::find()
            .select_only()
            .column(ingredients::Column::Id)
            .filter(ingredients::Column::Id.is_in(wanted.clone()))
            .into_tuple::<i64>()
            .all(conn)
            .await?
            .into_iter()
            .collect();
        errors.extend(
            wanted
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| format!("ingredient {id} does not exist")),
        );
    }

    let wanted: Vec<i64> = unique(tag_ids.iter().copied());
    if !wanted.is_empty() {
        let found: HashSet<i64> = Tags::find()
            .select_only()
            .column(tags::Column::Id)
            .filter(tags::Column::Id.is_in(wanted.clone()))
            .into_tuple::<i64>()
            .all(conn)
            .await?
            .into_iter()
            .collect();
        errors.extend(
            wanted
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| format!("tag {id} does not exist")),
        );
    }

    Ok(errors)
}

fn unique(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Clears and rewrites a recipe's tag set and ingredient rows.
async fn replace_links(
    txn: &DatabaseTransaction,
    recipe_id: i64,
    ingredients: &[IngredientAmountRequest],
    tag_ids: &[i64],
) -> AppResult<()> {
    RecipeTags::delete_many()
        .filter(recipe_tags::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;
    RecipeIngredients::delete_many()
        .filter(recipe_ingredients::Column::RecipeId.eq(recipe_id))
        .exec(txn)
        .await?;

    if !tag_ids.is_empty() {
        RecipeTags::insert_many(tag_ids.iter().map(|tag_id| RecipeTagActive {
            recipe_id: Set(recipe_id),
            tag_id: Set(*tag_id),
        }))
        .exec_without_returning(txn)
        .await?;
    }

    // amounts were range-checked by validation
    RecipeIngredients::insert_many(ingredients.iter().map(|item| RecipeIngredientActive {
        id: NotSet,
        recipe_id: Set(recipe_id),
        ingredient_id: Set(item.id),
        amount: Set(item.amount as i32),
    }))
    .exec_without_returning(txn)
    .await?;

    Ok(())
}

pub fn recipe_short(model: &RecipeModel) -> RecipeShort {
    RecipeShort {
        id: model.id,
        name: model.name.clone(),
        image: media::public_url(&model.image),
        cooking_time: model.cooking_time,
    }
}

async fn materialize_one<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    model: RecipeModel,
) -> AppResult<Recipe> {
    materialize(conn, viewer, vec![model])
        .await?
        .pop()
        .ok_or(AppError::NotFound)
}

/// Loads the nested author, tags and ingredient amounts for `models` and
/// resolves the per-viewer flags. Order of `models` is preserved.
pub async fn materialize<C: ConnectionTrait>(
    conn: &C,
    viewer: Option<i64>,
    models: Vec<RecipeModel>,
) -> AppResult<Vec<Recipe>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<i64> = models.iter().map(|m| m.id).collect();
    let author_ids: Vec<i64> = unique(models.iter().map(|m| m.author_id));

    let authors: HashMap<i64, users::Model> = Users::find()
        .filter(users::Column::Id.is_in(author_ids.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let followed = followed_among(conn, viewer, &author_ids).await?;
    let memberships = membership_service::memberships_among(conn, viewer, &recipe_ids).await?;

    let links = RecipeTags::find()
        .filter(recipe_tags::Column::RecipeId.is_in(recipe_ids.clone()))
        .all(conn)
        .await?;
    let tag_ids: Vec<i64> = unique(links.iter().map(|l| l.tag_id));
    let tags_by_id: HashMap<i64, Tag> = if tag_ids.is_empty() {
        HashMap::new()
    } else {
        Tags::find()
            .filter(tags::Column::Id.is_in(tag_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.id, Tag::from(t)))
            .collect()
    };
    let mut tags_by_recipe: HashMap<i64, Vec<Tag>> = HashMap::new();
    for link in links {
        if let Some(tag) = tags_by_id.get(&link.tag_id) {
            tags_by_recipe.entry(link.recipe_id).or_default().push(tag.clone());
        }
    }

    let amounts = RecipeIngredients::find()
        .filter(recipe_ingredients::Column::RecipeId.is_in(recipe_ids))
        .order_by_asc(recipe_ingredients::Column::Id)
        .find_also_related(Ingredients)
        .all(conn)
        .await?;
    let mut ingredients_by_recipe: HashMap<i64, Vec<RecipeIngredientAmount>> = HashMap::new();
    for (row, ingredient) in amounts {
        if let Some(ingredient) = ingredient {
            ingredients_by_recipe
                .entry(row.recipe_id)
                .or_default()
                .push(RecipeIngredientAmount {
                    id: ingredient.id,
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount: row.amount,
                });
        }
    }

    models
        .into_iter()
        .map(|model| {
            let author = authors.get(&model.author_id).cloned().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("author {} missing", model.author_id))
            })?;
            let is_subscribed = followed.contains(&author.id);
            let (is_favorited, is_in_shopping_cart) =
                membership_service::resolve_flags(viewer, &memberships, model.id);
            let mut tags = tags_by_recipe.remove(&model.id).unwrap_or_default();
            tags.sort_by(|a, b| a.slug.cmp(&b.slug));

            Ok(Recipe {
                id: model.id,
                tags,
                author: UserProfile::from_entity(author, is_subscribed),
                ingredients: ingredients_by_recipe.remove(&model.id).unwrap_or_default(),
                name: model.name,
                image: media::public_url(&model.image),
                text: model.text,
                cooking_time: model.cooking_time,
                is_favorited,
                is_in_shopping_cart,
                created_at: model.created_at.with_timezone(&Utc),
            })
        })
        .collect()
}
