use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, SetPasswordRequest},
        recipes::{CreateRecipeRequest, IngredientAmountRequest, RecipeList, UpdateRecipeRequest},
        tags::{
            CreateIngredientRequest, CreateTagRequest, IngredientList, TagList,
            UpdateIngredientRequest, UpdateTagRequest,
        },
        users::{SubscriptionList, UserList},
    },
    models::{Ingredient, Recipe, RecipeIngredientAmount, RecipeShort, Subscription, Tag, UserProfile},
    response::{ApiResponse, Meta},
    routes::{auth, health, ingredients, params, recipes, tags, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        users::register,
        users::list_users,
        users::get_user,
        users::me,
        users::set_password,
        users::list_subscriptions,
        users::subscribe,
        users::unsubscribe,
        tags::list_tags,
        tags::get_tag,
        tags::create_tag,
        tags::update_tag,
        tags::delete_tag,
        ingredients::list_ingredients,
        ingredients::get_ingredient,
        ingredients::create_ingredient,
        ingredients::update_ingredient,
        ingredients::delete_ingredient,
        recipes::list_recipes,
        recipes::get_recipe,
        recipes::create_recipe,
        recipes::update_recipe,
        recipes::delete_recipe,
        recipes::add_favorite,
        recipes::remove_favorite,
        recipes::add_to_shopping_cart,
        recipes::remove_from_shopping_cart,
        recipes::download_shopping_cart
    ),
    components(
        schemas(
            UserProfile,
            Tag,
            Ingredient,
            Recipe,
            RecipeShort,
            RecipeIngredientAmount,
            Subscription,
            RegisterRequest,
            SetPasswordRequest,
            LoginRequest,
            LoginResponse,
            CreateRecipeRequest,
            UpdateRecipeRequest,
            IngredientAmountRequest,
            CreateTagRequest,
            UpdateTagRequest,
            CreateIngredientRequest,
            UpdateIngredientRequest,
            RecipeList,
            TagList,
            IngredientList,
            UserList,
            SubscriptionList,
            params::Pagination,
            params::SubscriptionQuery,
            params::IngredientQuery,
            Meta,
            ApiResponse<Recipe>,
            ApiResponse<RecipeList>,
            ApiResponse<Subscription>,
            ApiResponse<UserProfile>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Token endpoints"),
        (name = "Users", description = "Registration and public profiles"),
        (name = "Subscriptions", description = "Following other authors"),
        (name = "Tags", description = "Recipe tags"),
        (name = "Ingredients", description = "Ingredient reference data"),
        (name = "Recipes", description = "Recipe endpoints"),
        (name = "Favorites", description = "Favorite recipes"),
        (name = "Shopping cart", description = "Shopping cart and list download"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
