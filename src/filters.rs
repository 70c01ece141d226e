//! Query-string filters translated into SeaORM conditions.

use sea_orm::{
    ColumnTrait, Condition,
    sea_query::{Expr, Query, SimpleExpr, extension::postgres::PgExpr},
};

use crate::{
    entity::{ingredients, recipe_memberships, recipe_tags, recipes, tags},
    error::{AppError, AppResult},
    models::ListKind,
    routes::params::Pagination,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i64>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        _ => Err(AppError::BadRequest(format!(
            "{key} must be one of 0, 1, true, false"
        ))),
    }
}

fn parse_i64(key: &str, value: &str) -> AppResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("{key} must be an integer")))
}

impl RecipeFilter {
    /// Parses a raw query string. `tags` may repeat; unknown keys are ignored.
    pub fn from_query(raw: Option<&str>) -> AppResult<(Self, Pagination)> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw.unwrap_or(""))
            .map_err(|e| AppError::BadRequest(format!("malformed query string: {e}")))?;

        let mut filter = RecipeFilter::default();
        let mut pagination = Pagination::default();
        for (key, value) in pairs {
            match key.as_str() {
                "author" => filter.author = Some(parse_i64(&key, &value)?),
                "tags" => {
                    if !value.is_empty() && !filter.tags.contains(&value) {
                        filter.tags.push(value);
                    }
                }
                "is_favorited" => filter.is_favorited = parse_bool(&key, &value)?,
                "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_bool(&key, &value)?,
                "page" => pagination.page = Some(parse_i64(&key, &value)?),
                "per_page" | "limit" => pagination.per_page = Some(parse_i64(&key, &value)?),
                _ => {}
            }
        }
        Ok((filter, pagination))
    }

    /// Builds the predicate for `viewer`. List filters only restrict when set
    /// to true and a viewer is known; `false` never excludes anything.
    pub fn condition(&self, viewer: Option<i64>) -> Condition {
        let mut condition = Condition::all();

        if let Some(author) = self.author {
            condition = condition.add(recipes::Column::AuthorId.eq(author));
        }

        if !self.tags.is_empty() {
            condition = condition.add(recipes_with_any_tag(&self.tags));
        }

        if let Some(user_id) = viewer {
            if self.is_favorited {
                condition = condition.add(recipes_in_list(user_id, ListKind::Favorite));
            }
            if self.is_in_shopping_cart {
                condition = condition.add(recipes_in_list(user_id, ListKind::ShoppingCart));
            }
        }

        condition
    }
}

fn recipes_with_any_tag(slugs: &[String]) -> SimpleExpr {
    recipes::Column::Id.in_subquery(
        Query::select()
            .column((recipe_tags::Entity, recipe_tags::Column::RecipeId))
            .from(recipe_tags::Entity)
            .inner_join(
                tags::Entity,
                Expr::col((tags::Entity, tags::Column::Id))
                    .equals((recipe_tags::Entity, recipe_tags::Column::TagId)),
            )
            .and_where(Expr::col((tags::Entity, tags::Column::Slug)).is_in(slugs.to_vec()))
            .to_owned(),
    )
}

/// `recipes.id IN (recipes in the user's <kind> list)`.
pub fn recipes_in_list(user_id: i64, kind: ListKind) -> SimpleExpr {
    recipes::Column::Id.in_subquery(list_recipe_ids(user_id, kind))
}

pub fn list_recipe_ids(user_id: i64, kind: ListKind) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(recipe_memberships::Column::RecipeId)
        .from(recipe_memberships::Entity)
        .and_where(recipe_memberships::Column::UserId.eq(user_id))
        .and_where(recipe_memberships::Column::Kind.eq(kind.as_str()))
        .to_owned()
}

/// Case-insensitive prefix match on ingredient names.
pub fn ingredient_name_prefix(prefix: &str) -> Option<SimpleExpr> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return None;
    }
    let pattern = format!("{}%", escape_like(prefix));
    Some(Expr::col(ingredients::Column::Name).ilike(pattern))
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};

    fn sql_for(filter: &RecipeFilter, viewer: Option<i64>) -> String {
        recipes::Entity::find()
            .filter(filter.condition(viewer))
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn parses_repeated_tags_and_flags() {
        let (filter, pagination) = RecipeFilter::from_query(Some(
            "tags=breakfast&tags=dinner&tags=breakfast&author=4&is_favorited=1&limit=3&page=2",
        ))
        .unwrap();
        assert_eq!(filter.tags, vec!["breakfast", "dinner"]);
        assert_eq!(filter.author, Some(4));
        assert!(filter.is_favorited);
        assert!(!filter.is_in_shopping_cart);
        assert_eq!(pagination.page, Some(2));
        assert_eq!(pagination.per_page, Some(3));
    }

    #[test]
    fn rejects_non_numeric_author() {
        assert!(RecipeFilter::from_query(Some("author=bob")).is_err());
        assert!(RecipeFilter::from_query(Some("is_favorited=maybe")).is_err());
    }

    #[test]
    fn empty_query_has_no_predicates() {
        let (filter, _) = RecipeFilter::from_query(None).unwrap();
        assert_eq!(filter, RecipeFilter::default());
        assert!(!sql_for(&filter, Some(1)).contains("WHERE"));
    }

    #[test]
    fn author_is_exact_match() {
        let filter = RecipeFilter {
            author: Some(9),
            ..Default::default()
        };
        assert!(sql_for(&filter, None).contains(r#""recipes"."author_id" = 9"#));
    }

    #[test]
    fn tags_match_any_slug() {
        let filter = RecipeFilter {
            tags: vec!["breakfast".into(), "supper".into()],
            ..Default::default()
        };
        let sql = sql_for(&filter, None);
        assert!(sql.contains(r#""tags"."slug" IN ('breakfast', 'supper')"#));
        assert!(sql.contains("recipe_tags"));
    }

    #[test]
    fn list_filters_need_an_authenticated_viewer() {
        let filter = RecipeFilter {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..Default::default()
        };
        assert!(!sql_for(&filter, None).contains("recipe_memberships"));

        let sql = sql_for(&filter, Some(5));
        assert!(sql.contains("'favorite'"));
        assert!(sql.contains("'shopping_cart'"));
    }

    #[test]
    fn false_flags_do_not_exclude_anything() {
        let filter = RecipeFilter::default();
        assert!(!sql_for(&filter, Some(5)).contains("recipe_memberships"));
    }

    #[test]
    fn ingredient_prefix_is_case_insensitive_and_escaped() {
        assert!(ingredient_name_prefix("  ").is_none());
        let sql = ingredients::Entity::find()
            .filter(ingredient_name_prefix("50%_sug").unwrap())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("ILIKE"));
        assert!(sql.contains("sug%"));
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }
}
