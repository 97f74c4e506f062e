use std::sync::Arc;

use civic_dispatch::config::DispatchConfig;
use civic_dispatch::deps::{AppDeps, Overrides};
use civic_dispatch::logging;
use civic_dispatch::store::{Database, LibSqlBackend};
use civic_dispatch::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = DispatchConfig::from_env()?;
    let _logging = logging::init(config.log_dir.as_deref())?;

    eprintln!("📨 Civic Dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {:?}", config.mode);
    eprintln!("   Inbound domain: {}", config.inbound_email_domain);
    eprintln!("   Webhooks: http://0.0.0.0:{}/inbound/{{email,sms}}", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    tracing::info!(path = %config.db_path.display(), "Database ready");

    // ── Dependencies ─────────────────────────────────────────────────────
    let port = config.http_port;
    let deps = AppDeps::build(config, db, Overrides::default());

    // ── HTTP server ──────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Inbound webhook server started");
    axum::serve(listener, web::app(&deps))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
