//! GitHub webhook server.
//!
//! Authenticates GitHub webhook deliveries and dispatches them as
//! `github/<event>` and `github/<event>/<action>` events.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use github_webhook::bus::Subscription;
use github_webhook::web::router;
use github_webhook::{AmqpBus, AppState, Config, EventBus, FanoutBus, LocalBus, TopicPattern};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        path = %config.path,
        webhooks = config.webhooks.len(),
        amqp_forwarding = config.cloudamqp_url.is_some(),
        "config_loaded"
    );

    let family = TopicPattern::parse("github/*").context("Invalid topic pattern")?;

    // Build the event bus
    let local = Arc::new(LocalBus::new());
    let amqp = config
        .cloudamqp_url
        .clone()
        .map(|url| AmqpBus::spawn(url, config.amqp_exchange.clone()));

    let mut buses: Vec<Arc<dyn EventBus>> = vec![local.clone() as Arc<dyn EventBus>];
    if let Some(amqp) = &amqp {
        buses.push(Arc::new(amqp.clone()));
    }
    let bus = Arc::new(FanoutBus::new(buses));
    bus.register(family.clone());
    info!("event_bus_registered");

    tokio::spawn(log_events(local.subscribe(family)));

    // Create application state
    let port = config.port;
    let state = AppState::new(config, bus);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Flush forwarded events
    if let Some(amqp) = amqp {
        amqp.close().await;
    }

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Log every event that reaches the in-process bus.
async fn log_events(mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        info!(
            topic = %event.topic,
            delivery_id = event.delivery_id.as_deref().unwrap_or(""),
            "event_emitted"
        );
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
