use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use notification_service::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker,
        database::DatabaseClient,
        email::EmailClient,
        fcm::FcmClient,
        health::HealthChecker,
        kafka::{KafkaConsumer, KafkaPublisher},
        redis::RedisClient,
        sms::SmsClient,
    },
    config::Config,
    models::circuit_breaker::{EMAIL_GATEWAY, FCM, SMS_GATEWAY},
    services::{
        dispatcher::NotificationDispatcher, processor::EventProcessor, sweeper::PendingSweeper,
        templates::TemplateCatalog, tracker::DeliveryTracker,
    },
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing();

    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        topics = ?config.kafka_topics,
        dead_letter_topic = %config.dead_letter_topic,
        "Configuration validated, starting notification worker"
    );

    let database = DatabaseClient::connect(&config.database_url).await?;
    database.migrate().await?;

    let redis = RedisClient::connect(&config).await?;
    let publisher = KafkaPublisher::connect(&config)?;

    let breaker = |service_name: &str| {
        CircuitBreaker::new(
            service_name,
            redis.connection(),
            config.circuit_breaker_config(),
        )
    };

    let email_breaker = breaker(EMAIL_GATEWAY);
    let sms_breaker = breaker(SMS_GATEWAY);

    let tracker = DeliveryTracker::new(Arc::new(database.clone()));
    let mut dispatcher = NotificationDispatcher::new(tracker.clone(), TemplateCatalog::builtin())
        .with_sender(Arc::new(EmailClient::from_config(&config, email_breaker.clone())?))
        .with_sender(Arc::new(SmsClient::from_config(&config, sms_breaker.clone())?));

    let mut breakers = vec![email_breaker, sms_breaker];

    match &config.fcm_project_id {
        Some(project_id) => {
            let fcm_breaker = breaker(FCM);
            let fcm_client = FcmClient::new(
                project_id,
                Duration::from_secs(config.http_timeout_seconds),
                config.retry_config(),
                fcm_breaker.clone(),
            )?;
            dispatcher = dispatcher.with_sender(Arc::new(fcm_client));
            breakers.push(fcm_breaker);
        }
        None => warn!("FCM_PROJECT_ID not set, push notifications will be recorded as failed"),
    }

    let processor = EventProcessor::new(
        dispatcher,
        Arc::new(redis.clone()),
        Arc::new(publisher.clone()),
        config.retry_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let health_checker = HealthChecker::new(database.clone(), redis.clone(), publisher.clone(), breakers);
    let api = tokio::spawn(run_api_server(
        config.server_port,
        health_checker,
        shutdown_rx.clone(),
    ));

    let sweeper = PendingSweeper::new(
        tracker,
        config.stale_pending_after_seconds,
        config.sweep_batch_size,
    );
    let sweep = tokio::spawn(sweeper.run(
        Duration::from_secs(config.sweep_interval_seconds),
        shutdown_rx.clone(),
    ));

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = signal_tx.send(true);
    });

    let consumer = KafkaConsumer::connect(&config)?;
    let result = consumer.run(&processor, shutdown_rx).await;

    if let Err(e) = &result {
        error!(error = %e, "Consumer stopped with error");
    }

    let _ = shutdown_tx.send(true);

    match api.await {
        Ok(Err(e)) => error!(error = %e, "Health check server failed"),
        Err(e) => error!(error = %e, "Health check server task panicked"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = sweep.await {
        error!(error = %e, "Pending sweeper task panicked");
    }

    drop(consumer);
    publisher.flush();

    info!("Notification worker stopped");
    result
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
}
