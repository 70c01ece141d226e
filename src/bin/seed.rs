use std::env;

use foodgram_api::{
    config::AppConfig,
    db::{OrmConn, create_pool, orm_from_pool, run_migrations},
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol},
    },
    middleware::auth::ROLE_ADMIN,
    services::{auth_service::hash_password, ingredient_service::import_ingredients},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm::ActiveValue::NotSet;

const DEFAULT_INGREDIENTS_CSV: &str = "data/ingredients.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let orm = orm_from_pool(pool);
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let csv_path = env::args()
        .nth(1)
        .or_else(|| env::var("INGREDIENTS_CSV").ok())
        .unwrap_or_else(|| DEFAULT_INGREDIENTS_CSV.to_string());
    let contents = tokio::fs::read_to_string(&csv_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {csv_path}: {e}"))?;
    let rows = import_ingredients(&orm, &contents).await?;
    println!("Imported {rows} ingredient rows from {csv_path}");

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".into());
    let username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".into());
    let admin_id = ensure_admin(&orm, &email, &username, &password).await?;

    println!("Seed completed. Admin ID: {admin_id}");
    Ok(())
}

async fn ensure_admin(
    orm: &OrmConn,
    email: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<i64> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        let id = existing.id;
        let mut active: UserActive = existing.into();
        active.role = Set(ROLE_ADMIN.to_string());
        active.update(orm).await?;
        println!("Ensured user {email} (role={ROLE_ADMIN})");
        return Ok(id);
    }

    let password_hash = hash_password(password)?;
    let user = UserActive {
        id: NotSet,
        email: Set(email.to_string()),
        username: Set(username.to_string()),
        first_name: Set("Admin".into()),
        last_name: Set("Admin".into()),
        password_hash: Set(password_hash),
        role: Set(ROLE_ADMIN.to_string()),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    println!("Created user {email} (role={ROLE_ADMIN})");
    Ok(user.id)
}
