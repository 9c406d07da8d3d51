//! Protectogram entrypoint: configuration, wiring, and the two runtimes
//! (HTTP server and scheduler loop) under one graceful shutdown.

use std::process::ExitCode;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use protectogram::adapters::http::{AppState, PgReadiness};
use protectogram::adapters::postgres::{
    PgAlertStore, PgCallAttemptStore, PgGuardianStore, PgInboxStore, PgIncidentStore,
    PgLeaderGate, PgOutboxStore, PgScheduledActionStore, PgUserStore,
};
use protectogram::adapters::telegram::{TelegramChatAdapter, TelegramConfig, TelegramUpdateParser};
use protectogram::adapters::telnyx::{
    TelnyxConfig, TelnyxEventParser, TelnyxVoiceAdapter, VoiceWebhookVerifier,
};
use protectogram::adapters::{telegram, telnyx};
use protectogram::application::scheduler::{
    action_types, HandlerRegistry, SchedulerConfig, SchedulerRunner,
};
use protectogram::application::{
    CascadeService, IncidentService, OutboxDispatcher, PlaceCallHandler, ReconcileAckHandler,
    ReminderHandler, RetryOutboxHandler, WebhookIngest,
};
use protectogram::config::AppConfig;
use protectogram::domain::cascade::Language;
use protectogram::ports::{
    AlertStore, CallAttemptStore, ChatPort, GuardianStore, InboxStore, IncidentStore,
    OutboxStore, ScheduledActionStore, UserStore, VoicePort,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    init_tracing(&config);

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return ExitCode::from(1);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal infrastructure error");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.server.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.acquire_timeout_secs,
        ))
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("database migrations applied");

    // Stores.
    let incidents: Arc<dyn IncidentStore> = Arc::new(PgIncidentStore::new(pool.clone()));
    let guardians: Arc<dyn GuardianStore> = Arc::new(PgGuardianStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let alerts: Arc<dyn AlertStore> = Arc::new(PgAlertStore::new(pool.clone()));
    let attempts: Arc<dyn CallAttemptStore> = Arc::new(PgCallAttemptStore::new(pool.clone()));
    let actions: Arc<dyn ScheduledActionStore> = Arc::new(PgScheduledActionStore::new(pool.clone()));
    let inbox: Arc<dyn InboxStore> = Arc::new(PgInboxStore::new(pool.clone()));
    let outbox: Arc<dyn OutboxStore> = Arc::new(PgOutboxStore::new(pool.clone()));

    // Provider ports.
    let chat_port: Arc<dyn ChatPort> = Arc::new(TelegramChatAdapter::new(TelegramConfig::new(
        config.chat.bot_token.clone(),
    )));
    let voice_port: Arc<dyn VoicePort> = Arc::new(TelnyxVoiceAdapter::new(TelnyxConfig::new(
        config.voice.api_key.clone(),
        config.voice.connection_id.clone(),
    )));

    // Services.
    let dispatcher = Arc::new(OutboxDispatcher::new(
        outbox,
        chat_port.clone(),
        voice_port,
    ));
    let incident_service = Arc::new(IncidentService::new(
        incidents.clone(),
        alerts.clone(),
        attempts.clone(),
        actions.clone(),
        users.clone(),
        dispatcher.clone(),
        Language::default(),
    ));
    let cascade = Arc::new(CascadeService::new(
        incidents,
        guardians,
        users,
        alerts,
        attempts,
        actions.clone(),
        dispatcher.clone(),
        incident_service.clone(),
        chat_port,
        config.cascade.defaults(),
        config.features.whitelist_policy(),
        config.server.voice_webhook_url(),
        Language::default(),
        config.features.panic_enabled,
    ));
    let ingest = Arc::new(
        WebhookIngest::new(inbox, cascade.clone())
            .with_parser(telegram::PROVIDER_TAG, Arc::new(TelegramUpdateParser::new()))
            .with_parser(telnyx::PROVIDER_TAG, Arc::new(TelnyxEventParser::new())),
    );

    // Scheduler.
    let registry = HandlerRegistry::new()
        .register(
            action_types::PLACE_CALL,
            Arc::new(PlaceCallHandler::new(cascade.clone())),
        )
        .register(
            action_types::SEND_REMINDER,
            Arc::new(ReminderHandler::new(cascade.clone())),
        )
        .register(
            action_types::RECONCILE_ACK,
            Arc::new(ReconcileAckHandler::new(incident_service)),
        )
        .register(
            action_types::RETRY_OUTBOX,
            Arc::new(RetryOutboxHandler::new(dispatcher)),
        );
    let runner = Arc::new(
        SchedulerRunner::new(
            actions,
            Arc::new(registry),
            Arc::new(PgLeaderGate::new(pool.clone())),
            SchedulerConfig::default(),
        )
        .with_sweeper(ingest.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = if config.features.scheduler_enabled {
        let runner = Arc::clone(&runner);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { runner.run(rx).await }))
    } else {
        tracing::info!("scheduler disabled on this process");
        None
    };

    // HTTP surface.
    let state = AppState {
        ingest,
        cascade,
        chat_webhook_secret: config.chat.webhook_secret.clone(),
        voice_verifier: Arc::new(VoiceWebhookVerifier::new(config.voice.api_key.clone())),
        admin_key: config.admin.admin_key.clone(),
        readiness: Arc::new(PgReadiness::new(
            pool,
            runner.started_flag(),
            config.features.scheduler_enabled,
        )),
        metrics: metrics_handle,
        panic_enabled: config.features.panic_enabled,
    };
    let app = protectogram::adapters::http::router(state, config.server.request_timeout_secs);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server stopped; drain the scheduler.
    shutdown_tx.send(true).ok();
    if let Some(task) = scheduler_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "scheduler exited with error"),
            Err(e) => tracing::error!(error = %e, "scheduler task panicked"),
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
