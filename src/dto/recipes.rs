use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Recipe;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
pub struct IngredientAmountRequest {
    pub id: i64,
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecipeRequest {
    pub ingredients: Vec<IngredientAmountRequest>,
    pub tags: Vec<i64>,
    /// Base64 data URI, e.g. `data:image/png;base64,...`.
    pub image: String,
    pub name: String,
    pub text: String,
    pub cooking_time: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRecipeRequest {
    pub ingredients: Vec<IngredientAmountRequest>,
    pub tags: Vec<i64>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct RecipeList {
    #[schema(value_type = Vec<Recipe>)]
    pub items: Vec<Recipe>,
}
