//! Seeds the demo accounts. Safe to run repeatedly; existing usernames are
//! left untouched.

use sessiongate_backend::{
    config::Config,
    db::connection::create_pool,
    models::user::User,
    repositories::user::{PgUserStore, UserStore},
    utils::password::hash_password,
};

const SEED_USERS: &[(&str, &str, &str)] = &[
    ("admin", "admin@example.com", "Admin@123"),
    ("testuser", "test@example.com", "Test@123"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let users = PgUserStore::new(pool);

    for (username, email, password) in SEED_USERS {
        if users
            .username_exists(username)
            .await
            .map_err(|err| anyhow::anyhow!("failed to check for {}: {:?}", username, err))?
        {
            tracing::info!("User {} already exists, skipping", username);
            continue;
        }

        let user = User::new(
            username.to_string(),
            email.to_string(),
            hash_password(password)?,
        );
        users
            .insert(&user)
            .await
            .map_err(|err| anyhow::anyhow!("failed to insert {}: {:?}", username, err))?;
        tracing::info!("Seeded user {}", username);
    }

    Ok(())
}
