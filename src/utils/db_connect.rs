// src/utils/db_connect.rs

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::env;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("POSTGRES_PORT")
        .unwrap_or_else(|_| "5432".to_string())
        .parse::<u16>()
        .unwrap_or(5432);
    let dbname = env::var("POSTGRES_DB").unwrap_or_else(|_| "electoral_roll".to_string());
    let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("voter_dedupe");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool and checks it with a test query.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(16)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    {
        let conn = pool
            .get()
            .await
            .context("Failed to get test connection from pool")?;
        conn.query_one("SELECT 1", &[])
            .await
            .context("Test query 'SELECT 1' failed")?;
    }
    info!("Database connection pool initialized successfully.");
    Ok(pool)
}

/// `(connections, idle_connections, in_use)` for the pool.
pub fn get_pool_status(pool: &PgPool) -> (u32, u32, u32) {
    let state = pool.state();
    (
        state.connections,
        state.idle_connections,
        state.connections.saturating_sub(state.idle_connections),
    )
}
