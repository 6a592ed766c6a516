use std::sync::Arc;

use anyhow::{Context, Result};
use registry_db::init_db_pool;
use registry_db::store::{SharedStore, SqliteStore};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use front_desk::roster::run_sync_task;
use front_desk::routes;
use front_desk::session::{FileSessionPersistence, SessionManager};
use front_desk::state::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = init_db_pool(&config.db).await?;
    let store: SharedStore = Arc::new(SqliteStore::new(pool));

    let persistence = FileSessionPersistence::new(config.session_path.clone());
    let sessions = SessionManager::init(Box::new(persistence), store.as_ref())
        .await
        .context("Falha ao inicializar a sessão")?;

    let state = Arc::new(AppState::new(Arc::clone(&store), sessions));

    // Painel compartilhado mantido em segundo plano
    tokio::spawn(run_sync_task(
        Arc::clone(&state.roster),
        Arc::clone(&store),
        config.roster_sync,
    ));

    let app = routes::router(Arc::clone(&state));

    info!("Recepção escutando em {}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await
        .context("Servidor HTTP encerrou com erro")?;

    Ok(())
}
