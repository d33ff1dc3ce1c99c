use crate::entities::{cloud_files, storage_providers};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    crate::infrastructure::seed::seed_default_provider(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let db_url = env::var("DATABASE_URL")?;

    if db_url.starts_with("postgres://") {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        let pool = sqlx::PgPool::connect(&db_url).await?;
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            info!("⚠️ SQLx migration error: {}. Skipping as requested.", e);
        }
    } else {
        info!("🔄 Running SeaORM auto-migrations for SQLite/Other...");
        let builder = db.get_database_backend();
        let schema = Schema::new(builder);

        let stmts = vec![
            schema
                .create_table_from_entity(storage_providers::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(cloud_files::Entity)
                .if_not_exists()
                .to_owned(),
        ];

        for stmt in stmts {
            let stmt = builder.build(&stmt);
            let _ = db.execute(stmt).await;
        }
    }

    Ok(())
}
