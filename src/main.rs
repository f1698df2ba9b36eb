pub mod auth;
pub mod catalog;
pub mod config;
pub mod err;
pub mod models;
pub mod routes;
pub mod store;
pub mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::catalog::Catalog;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    // a database that cannot be reached at startup is fatal
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    store::prepare(&pool).await?;

    let catalog = Arc::new(Catalog::fixed());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = routes::router(pool, catalog, Arc::new(config));

    log::info!("Starting campus registration server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
