use std::collections::BTreeMap;

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QuerySelect, RelationTrait,
};

use crate::{
    entity::{ingredients, recipe_ingredients, RecipeIngredients},
    error::AppResult,
    filters::list_recipe_ids,
    middleware::auth::AuthUser,
    models::{ListKind, ShoppingListItem},
    state::AppState,
};

#[derive(Debug, Clone, FromQueryResult)]
pub struct ShoppingListRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

pub struct ShoppingListFile {
    pub filename: String,
    pub body: String,
}

/// Every ingredient row of every recipe in the user's shopping cart.
async fn cart_rows<C: ConnectionTrait>(conn: &C, user_id: i64) -> AppResult<Vec<ShoppingListRow>> {
    let rows = RecipeIngredients::find()
        .select_only()
        .column_as(ingredients::Column::Name, "name")
        .column_as(ingredients::Column::MeasurementUnit, "measurement_unit")
        .column_as(recipe_ingredients::Column::Amount, "amount")
        .join(
            JoinType::InnerJoin,
            recipe_ingredients::Relation::Ingredients.def(),
        )
        .filter(
            recipe_ingredients::Column::RecipeId
                .in_subquery(list_recipe_ids(user_id, ListKind::ShoppingCart)),
        )
        .into_model::<ShoppingListRow>()
        .all(conn)
        .await?;
    Ok(rows)
}

pub async fn build_shopping_list<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> AppResult<Vec<ShoppingListItem>> {
    let rows = cart_rows(conn, user_id).await?;
    Ok(aggregate(rows))
}

/// Sums amounts per `(name, unit)`; output is sorted by name, then unit.
pub fn aggregate(rows: impl IntoIterator<Item = ShoppingListRow>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *totals.entry((row.name, row.measurement_unit)).or_insert(0) += i64::from(row.amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListItem {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

pub fn render(items: &[ShoppingListItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{} ({}) \u{2014} {}",
                item.name, item.measurement_unit, item.total_amount
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn download(state: &AppState, user: &AuthUser) -> AppResult<ShoppingListFile> {
    let items = build_shopping_list(&state.orm, user.user_id).await?;
    tracing::debug!(user_id = user.user_id, lines = items.len(), "shopping list built");
    Ok(ShoppingListFile {
        filename: state.config.shopping_list_filename.clone(),
        body: render(&items),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> ShoppingListRow {
        ShoppingListRow {
            name: name.into(),
            measurement_unit: unit.into(),
            amount,
        }
    }

    fn item(name: &str, unit: &str, total_amount: i64) -> ShoppingListItem {
        ShoppingListItem {
            name: name.into(),
            measurement_unit: unit.into(),
            total_amount,
        }
    }

    #[test]
    fn sums_amounts_across_recipes() {
        // recipe A: 2 salt, 3 sugar; recipe B: 1 salt
        let items = aggregate(vec![
            row("salt", "g", 2),
            row("sugar", "g", 3),
            row("salt", "g", 1),
        ]);
        assert_eq!(items, vec![item("salt", "g", 3), item("sugar", "g", 3)]);
    }

    #[test]
    fn same_name_with_different_units_stays_separate() {
        let items = aggregate(vec![row("milk", "ml", 200), row("milk", "cup", 1)]);
        assert_eq!(items, vec![item("milk", "cup", 1), item("milk", "ml", 200)]);
    }

    #[test]
    fn empty_cart_renders_empty_file() {
        assert!(aggregate(Vec::new()).is_empty());
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn renders_one_line_per_item() {
        let text = render(&[item("flour", "g", 500), item("eggs", "pcs", 2)]);
        assert_eq!(text, "flour (g) \u{2014} 500\neggs (pcs) \u{2014} 2");
    }
}
