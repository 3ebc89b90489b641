mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

use microblog_api::auth::{AppState, AppStateInner};
use microblog_api::config::Config;
use microblog_api::email::{LettreMailer, Mailer};
use microblog_api::error::panic_response;
use microblog_api::views::Views;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Config
    let config = Config::from_env()?;

    let mailer: Arc<dyn Mailer> = Arc::new(LettreMailer::new(&config.mail)?);

    logging::init(&config, mailer.clone())?;
    info!("Microblog startup");

    // Init database
    let db = microblog_db::Database::open(&config.database_path)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        views: Views::new()?,
        mailer,
        config,
    });

    let app = microblog_api::router(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());

    info!("Microblog listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
