use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use outreach_mailer::config::Config;
use outreach_mailer::routes::{self, AppState};
use outreach_mailer::services::{dispatcher, maintenance, replies};
use outreach_mailer::transport::{MailTransport, SmtpMailTransport};
use outreach_mailer::{db, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Arc::new(Config::from_env());

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!(database=%config.database_url, "database ready");

    let transport: Arc<dyn MailTransport> = Arc::new(
        SmtpMailTransport::from_config(&config)
            .map_err(|e| anyhow::anyhow!("smtp transport init failed: {e}"))?,
    );

    dispatcher::start(pool.clone(), transport.clone(), config.clone());
    replies::start(pool.clone(), transport.clone(), config.clone());
    maintenance::start(pool.clone());

    let state = AppState {
        pool,
        config: config.clone(),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr=%config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
