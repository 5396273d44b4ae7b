use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use greenhouse_service::{
    api::{self, AppState},
    chat::{
        classifier::Classifier,
        client::{CompletionClient, OpenAiClient},
        ChatGateway,
    },
    commands::CommandQueue,
    config::Config,
    db::{
        commands::MySqlCommandStore, reports::MySqlReportStore, telemetry::MySqlTelemetryStore,
        users::MySqlUserStore, Database,
    },
    notify::{LogNotifier, Notifier, WebhookNotifier},
    reports::ReportService,
    telemetry::IngestService,
    users::UserService,
};

/// How long shutdown waits for moisture alerts still being delivered.
const ALERT_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let db = Database::connect(&config.database_url, config.db_max_connections).await?;
    db.run_migrations().await?;
    info!("Database ready");

    let telemetry = Arc::new(MySqlTelemetryStore::new(db.pool().clone()));
    let queue = CommandQueue::new(
        Arc::new(MySqlCommandStore::new(db.pool().clone())),
        telemetry.clone(),
    );

    let notifier: Arc<dyn Notifier> = match &config.alert_webhook_url {
        Some(url) => {
            info!(url = %url, "Critical alerts go to webhook");
            Arc::new(WebhookNotifier::new(url.clone())?)
        }
        None => {
            info!("ALERT_WEBHOOK_URL not set, critical alerts are only logged");
            Arc::new(LogNotifier)
        }
    };

    let llm = OpenAiClient::from_config(&config.llm)?
        .map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
    if llm.is_none() {
        warn!("LLM_API_KEY not set, chatbot answers with a fixed message");
    }
    let classifier = Classifier::standard().context("invalid chat classifier rules")?;
    let ingest = IngestService::new(
        telemetry.clone(),
        notifier,
        config.default_device_id.clone(),
        config.moisture_alert_threshold,
    );

    let state = AppState {
        auth: Arc::new(config.auth.clone()),
        users: UserService::new(Arc::new(MySqlUserStore::new(db.pool().clone()))),
        source: Arc::new(queue.clone()),
        queue,
        ingest: ingest.clone(),
        reports: ReportService::new(
            Arc::new(MySqlReportStore::new(db.pool().clone())),
            config.fixed_daily_energy_kwh,
        ),
        chat: ChatGateway::new(classifier, telemetry, llm),
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingest.drain_alerts(ALERT_DRAIN_GRACE).await;
    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
