use sea_orm::{
    ActiveModelTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::OnConflict,
};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    dto::tags::{CreateIngredientRequest, IngredientList, UpdateIngredientRequest},
    entity::{
        Ingredients,
        ingredients::{ActiveModel, Column},
    },
    error::{AppError, AppResult},
    filters::ingredient_name_prefix,
    middleware::auth::{AuthUser, ensure_admin},
    models::Ingredient,
    response::{ApiResponse, Meta},
    routes::params::IngredientQuery,
    state::AppState,
    validation::into_result,
};

const MAX_FIELD_LEN: usize = 200;
const DUPLICATE: &str = "This ingredient with this measurement unit already exists";
const IMPORT_BATCH: usize = 500;

pub async fn list_ingredients(
    state: &AppState,
    query: IngredientQuery,
) -> AppResult<ApiResponse<IngredientList>> {
    let mut finder = Ingredients::find().order_by_asc(Column::Id);
    if let Some(predicate) = query.name.as_deref().and_then(ingredient_name_prefix) {
        finder = finder.filter(predicate);
    }
    let items: Vec<Ingredient> = finder
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Ingredient::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Ingredients",
        IngredientList { items },
        Some(Meta::total(total)),
    ))
}

pub async fn get_ingredient(state: &AppState, id: i64) -> AppResult<ApiResponse<Ingredient>> {
    let ingredient = Ingredients::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Ingredient",
        Ingredient::from(ingredient),
        None,
    ))
}

fn field_errors(name: Option<&str>, unit: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, value) in [("name", name), ("measurement_unit", unit)] {
        if let Some(value) = value {
            if value.trim().is_empty() || value.chars().count() > MAX_FIELD_LEN {
                errors.push(format!(
                    "{field} must be between 1 and {MAX_FIELD_LEN} characters"
                ));
            }
        }
    }
    errors
}

pub async fn create_ingredient(
    state: &AppState,
    user: &AuthUser,
    payload: CreateIngredientRequest,
) -> AppResult<ApiResponse<Ingredient>> {
    ensure_admin(user)?;
    into_result(field_errors(
        Some(&payload.name),
        Some(&payload.measurement_unit),
    ))?;

    let ingredient = ActiveModel {
        id: NotSet,
        name: Set(payload.name.trim().to_string()),
        measurement_unit: Set(payload.measurement_unit.trim().to_string()),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::on_unique_violation(err, DUPLICATE))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "ingredient_create",
        "ingredients",
        serde_json::json!({ "ingredient_id": ingredient.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Ingredient created",
        Ingredient::from(ingredient),
        Some(Meta::empty()),
    ))
}

pub async fn update_ingredient(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateIngredientRequest,
) -> AppResult<ApiResponse<Ingredient>> {
    ensure_admin(user)?;
    into_result(field_errors(
        payload.name.as_deref(),
        payload.measurement_unit.as_deref(),
    ))?;

    let existing = Ingredients::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(unit) = payload.measurement_unit {
        active.measurement_unit = Set(unit.trim().to_string());
    }
    let ingredient = active
        .update(&state.orm)
        .await
        .map_err(|err| AppError::on_unique_violation(err, DUPLICATE))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "ingredient_update",
        "ingredients",
        serde_json::json!({ "ingredient_id": ingredient.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Ingredient::from(ingredient),
        Some(Meta::empty()),
    ))
}

pub async fn delete_ingredient(state: &AppState, user: &AuthUser, id: i64) -> AppResult<()> {
    ensure_admin(user)?;
    let result = Ingredients::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "ingredient_delete",
        "ingredients",
        serde_json::json!({ "ingredient_id": id }),
    )
    .await;
    Ok(())
}

/// Parses one `name,unit` line. The unit is taken after the last comma so
/// names may contain commas; blank and malformed lines yield `None`.
pub fn parse_ingredient_row(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (name, unit) = line.rsplit_once(',')?;
    let name = name.trim().trim_matches('"').trim();
    let unit = unit.trim().trim_matches('"').trim();
    if name.is_empty() || unit.is_empty() {
        return None;
    }
    Some((name.to_string(), unit.to_string()))
}

/// Bulk-loads reference ingredients; rows already present are left alone.
/// Returns the number of rows read from `contents`.
pub async fn import_ingredients<C: ConnectionTrait>(conn: &C, contents: &str) -> AppResult<usize> {
    let rows: Vec<(String, String)> = contents.lines().filter_map(parse_ingredient_row).collect();

    for batch in rows.chunks(IMPORT_BATCH) {
        let models = batch.iter().map(|(name, unit)| ActiveModel {
            id: NotSet,
            name: Set(name.clone()),
            measurement_unit: Set(unit.clone()),
        });
        Ingredients::insert_many(models)
            .on_conflict(
                OnConflict::columns([Column::Name, Column::MeasurementUnit])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
    }

    tracing::info!(rows = rows.len(), "ingredients imported");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_rows() {
        assert_eq!(
            parse_ingredient_row("абрикосовое варенье,г"),
            Some(("абрикосовое варенье".into(), "г".into()))
        );
        assert_eq!(
            parse_ingredient_row("  salt , g \r"),
            Some(("salt".into(), "g".into()))
        );
    }

    #[test]
    fn unit_comes_after_the_last_comma() {
        assert_eq!(
            parse_ingredient_row("\"salt, sea\",g"),
            Some(("salt, sea".into(), "g".into()))
        );
    }

    #[test]
    fn skips_blank_and_malformed_rows() {
        assert_eq!(parse_ingredient_row(""), None);
        assert_eq!(parse_ingredient_row("no unit here"), None);
        assert_eq!(parse_ingredient_row(",g"), None);
        assert_eq!(parse_ingredient_row("salt,"), None);
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert_eq!(field_errors(Some(" "), Some("g")).len(), 1);
        assert!(field_errors(None, None).is_empty());
    }
}
