use foodgram_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    entity::users::ActiveModel as UserActive,
    middleware::auth::AuthUser,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use tempfile::TempDir;

pub const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run flow tests.");
            None
        }
    }
}

/// Migrated, emptied database plus a throwaway media root. Tags seeded by
/// migrations are kept.
pub async fn setup_state(database_url: &str) -> anyhow::Result<(AppState, TempDir)> {
    let media = tempfile::tempdir()?;
    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        media_root: media.path().to_path_buf(),
        shopping_list_filename: "shopping_list.txt".into(),
        max_body_bytes: 10 * 1024 * 1024,
    };
    let pool = create_pool(database_url).await?;
    let state = AppState::new(pool, config);
    run_migrations(&state.orm).await?;

    let backend = state.orm.get_database_backend();
    state
        .orm
        .execute(Statement::from_string(
            backend,
            "TRUNCATE TABLE audit_logs, follows, recipe_memberships, recipe_ingredients, recipe_tags, recipes, ingredients, users RESTART IDENTITY CASCADE",
        ))
        .await?;

    Ok((state, media))
}

pub async fn create_user(state: &AppState, username: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: NotSet,
        email: Set(format!("{username}@example.com")),
        username: Set(username.to_string()),
        first_name: Set(username.to_string()),
        last_name: Set("Tester".into()),
        password_hash: Set("dummy".into()),
        role: Set("user".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}
