mod common;

use std::collections::BTreeSet;

use foodgram_api::{
    dto::recipes::{CreateRecipeRequest, IngredientAmountRequest, UpdateRecipeRequest},
    entity::{
        Ingredients, RecipeMemberships, Tags, ingredients,
        recipe_memberships::{self, ActiveModel as MembershipActive},
        tags,
    },
    error::AppError,
    models::{ListKind, Recipe},
    services::{
        ingredient_service::import_ingredients, membership_service, recipe_service,
        shopping_list_service,
    },
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

use common::{PIXEL_PNG, create_user, database_url, setup_state};

fn amount(id: i64, amount: i64) -> IngredientAmountRequest {
    IngredientAmountRequest { id, amount }
}

fn recipe_request(name: &str, items: Vec<IngredientAmountRequest>, tags: Vec<i64>) -> CreateRecipeRequest {
    CreateRecipeRequest {
        ingredients: items,
        tags,
        image: PIXEL_PNG.into(),
        name: name.into(),
        text: format!("How to cook {name}"),
        cooking_time: 15,
    }
}

fn amounts_of(recipe: &Recipe) -> BTreeSet<(i64, i32)> {
    recipe.ingredients.iter().map(|i| (i.id, i.amount)).collect()
}

fn tag_ids_of(recipe: &Recipe) -> BTreeSet<i64> {
    recipe.tags.iter().map(|t| t.id).collect()
}

// Recipe CRUD, favorites/cart membership rules and the aggregated shopping list.
#[tokio::test]
async fn recipe_lists_and_shopping_list_flow() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };
    let (state, media) = setup_state(&database_url).await?;

    let cook = create_user(&state, "cook").await?;
    let guest = create_user(&state, "guest").await?;

    assert_eq!(import_ingredients(&state.orm, "salt,g\nsugar,g\n\nbroken row").await?, 2);
    // re-import is a no-op
    import_ingredients(&state.orm, "salt,g").await?;
    assert_eq!(Ingredients::find().count(&state.orm).await?, 2);

    let salt = Ingredients::find()
        .filter(ingredients::Column::Name.eq("salt"))
        .one(&state.orm)
        .await?
        .expect("salt");
    let sugar = Ingredients::find()
        .filter(ingredients::Column::Name.eq("sugar"))
        .one(&state.orm)
        .await?
        .expect("sugar");
    let breakfast = Tags::find()
        .filter(tags::Column::Slug.eq("breakfast"))
        .one(&state.orm)
        .await?
        .expect("default tag");
    let dinner = Tags::find()
        .filter(tags::Column::Slug.eq("dinner"))
        .one(&state.orm)
        .await?
        .expect("default tag");

    // Create and round-trip
    let a = recipe_service::create_recipe(
        &state,
        &cook,
        recipe_request(
            "Pancakes",
            vec![amount(salt.id, 2), amount(sugar.id, 3)],
            vec![breakfast.id],
        ),
    )
    .await?
    .data
    .unwrap();
    let b = recipe_service::create_recipe(
        &state,
        &cook,
        recipe_request("Soup", vec![amount(salt.id, 1)], vec![dinner.id]),
    )
    .await?
    .data
    .unwrap();

    let fetched = recipe_service::get_recipe(&state, None, a.id).await?.data.unwrap();
    assert_eq!(amounts_of(&fetched), BTreeSet::from([(salt.id, 2), (sugar.id, 3)]));
    assert_eq!(tag_ids_of(&fetched), BTreeSet::from([breakfast.id]));
    assert_eq!(fetched.author.id, cook.user_id);
    assert!(fetched.image.starts_with("/media/recipes/"));
    let stored = fetched.image.trim_start_matches("/media/");
    assert!(media.path().join(stored).exists());

    // Duplicate ingredient ids are rejected with every problem listed
    let err = recipe_service::create_recipe(
        &state,
        &cook,
        recipe_request(
            "Twice salted",
            vec![amount(salt.id, 1), amount(salt.id, 2)],
            vec![breakfast.id, breakfast.id],
        ),
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(messages) => {
            assert!(messages.iter().any(|m| m.contains("more than once")));
            assert!(messages.iter().any(|m| m.contains("tag")));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Unknown ingredient ids are validation errors too
    let err = recipe_service::create_recipe(
        &state,
        &cook,
        recipe_request("Ghost", vec![amount(9_999, 1)], vec![]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Favorites: second add fails, exactly one row remains
    membership_service::add_to_list(&state, &guest, a.id, ListKind::Favorite).await?;
    let err = membership_service::add_to_list(&state, &guest, a.id, ListKind::Favorite)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));
    assert_eq!(RecipeMemberships::find().count(&state.orm).await?, 1);

    let err = membership_service::remove_from_list(&state, &guest, b.id, ListKind::Favorite)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(RecipeMemberships::find().count(&state.orm).await?, 1);

    let err = membership_service::add_to_list(&state, &guest, 9_999, ListKind::Favorite)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Concurrent adds: exactly one wins, the other sees AlreadyExists
    let (first, second) = tokio::join!(
        membership_service::add_to_list(&state, &cook, b.id, ListKind::Favorite),
        membership_service::add_to_list(&state, &cook, b.id, ListKind::Favorite),
    );
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    for result in [first, second] {
        if let Err(err) = result {
            assert!(matches!(err, AppError::AlreadyExists(_)), "unexpected error: {err:?}");
        }
    }
    let cook_favorites = RecipeMemberships::find()
        .filter(recipe_memberships::Column::UserId.eq(cook.user_id))
        .filter(recipe_memberships::Column::Kind.eq(ListKind::Favorite.as_str()))
        .count(&state.orm)
        .await?;
    assert_eq!(cook_favorites, 1);

    // A duplicate row that slips past the existence check is stopped by the constraint
    let err = MembershipActive {
        id: NotSet,
        user_id: Set(cook.user_id),
        recipe_id: Set(b.id),
        kind: Set(ListKind::Favorite.as_str().to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "duplicate"))
    .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(message) if message == "duplicate"));

    // Flags resolve per viewer; anonymous viewers never see them set
    let anonymous = recipe_service::get_recipe(&state, None, a.id).await?.data.unwrap();
    assert!(!anonymous.is_favorited);
    let seen_by_guest = recipe_service::get_recipe(&state, Some(&guest), a.id)
        .await?
        .data
        .unwrap();
    assert!(seen_by_guest.is_favorited);
    assert!(!seen_by_guest.is_in_shopping_cart);

    // Filters
    let favorites = recipe_service::list_recipes(&state, Some(&guest), Some("is_favorited=1"))
        .await?
        .data
        .unwrap()
        .items;
    assert_eq!(favorites.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a.id]);

    let everything = recipe_service::list_recipes(&state, None, Some("is_favorited=1"))
        .await?
        .data
        .unwrap()
        .items;
    assert_eq!(everything.len(), 2);

    let dinners = recipe_service::list_recipes(&state, None, Some("tags=dinner"))
        .await?
        .data
        .unwrap()
        .items;
    assert_eq!(dinners.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);

    let by_cook = recipe_service::list_recipes(
        &state,
        None,
        Some(&format!("author={}&tags=breakfast&tags=dinner", cook.user_id)),
    )
    .await?;
    assert_eq!(by_cook.meta.unwrap().total, Some(2));

    // Shopping list: A (2 salt, 3 sugar) + B (1 salt)
    membership_service::add_to_list(&state, &guest, a.id, ListKind::ShoppingCart).await?;
    membership_service::add_to_list(&state, &guest, b.id, ListKind::ShoppingCart).await?;
    let items = shopping_list_service::build_shopping_list(&state.orm, guest.user_id).await?;
    let totals: Vec<(&str, i64)> = items
        .iter()
        .map(|i| (i.name.as_str(), i.total_amount))
        .collect();
    assert_eq!(totals, vec![("salt", 3), ("sugar", 3)]);

    let file = shopping_list_service::download(&state, &guest).await?;
    assert_eq!(file.filename, "shopping_list.txt");
    assert_eq!(file.body.lines().count(), 2);

    assert!(
        shopping_list_service::build_shopping_list(&state.orm, cook.user_id)
            .await?
            .is_empty()
    );

    // Only the author may change a recipe
    let update = || UpdateRecipeRequest {
        ingredients: vec![amount(salt.id, 5)],
        tags: vec![dinner.id],
        image: None,
        name: Some("Salty pancakes".into()),
        text: None,
        cooking_time: Some(20),
    };
    let err = recipe_service::update_recipe(&state, &guest, a.id, update())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let updated = recipe_service::update_recipe(&state, &cook, a.id, update())
        .await?
        .data
        .unwrap();
    assert_eq!(amounts_of(&updated), BTreeSet::from([(salt.id, 5)]));
    assert_eq!(tag_ids_of(&updated), BTreeSet::from([dinner.id]));
    assert_eq!(updated.name, "Salty pancakes");
    assert_eq!(updated.text, "How to cook Pancakes");
    assert_eq!(updated.cooking_time, 20);

    // Deleting cascades to memberships
    let err = recipe_service::delete_recipe(&state, &guest, b.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    recipe_service::delete_recipe(&state, &cook, b.id).await?;
    assert!(matches!(
        recipe_service::get_recipe(&state, None, b.id).await,
        Err(AppError::NotFound)
    ));
    let items = shopping_list_service::build_shopping_list(&state.orm, guest.user_id).await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].total_amount, 5);

    Ok(())
}
