//! RabbitMQ forwarding bus.
//!
//! Dispatched events are handed to a single background task that publishes
//! them, in emission order, to a durable topic exchange. Routing keys are the
//! topic with `/` replaced by `.`, so consumers bind with e.g. `github.#` or
//! `github.pull_request.*`.

use std::sync::Arc;

use anyhow::{Context, Result};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, warn};

use super::types::{routing_key, DispatchedEvent, PatternSet, TopicPattern};
use super::EventBus;

/// Events buffered for the publisher task before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Publish(DispatchedEvent),
    Close(oneshot::Sender<()>),
}

/// Event bus forwarding to a RabbitMQ topic exchange.
///
/// Cloning is cheap; all clones feed the same publisher task.
#[derive(Clone)]
pub struct AmqpBus {
    commands: mpsc::Sender<Command>,
    registered: Arc<PatternSet>,
}

impl AmqpBus {
    /// Start the publisher task. The connection is opened lazily on the
    /// first publish. Must be called from within a tokio runtime.
    pub fn spawn(url: String, exchange: String) -> Self {
        Self::spawn_with_capacity(url, exchange, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`AmqpBus::spawn`] with an explicit queue bound. Events emitted
    /// while `capacity` events are pending are dropped.
    pub fn spawn_with_capacity(url: String, exchange: String, capacity: usize) -> Self {
        let (commands, receiver) = mpsc::channel(capacity);
        let publisher = Publisher::new(url, exchange);
        tokio::spawn(publisher.run(receiver));

        Self {
            commands,
            registered: Arc::new(PatternSet::default()),
        }
    }

    /// Flush pending events and close the connection gracefully.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Close(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

impl AmqpBus {
    /// Queue an event for publishing. Returns whether it was queued.
    fn enqueue(&self, event: DispatchedEvent) -> bool {
        if !self.registered.covers(&event.topic) {
            debug!(topic = %event.topic, "amqp_bus_topic_not_registered");
            return false;
        }

        match self.commands.try_send(Command::Publish(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(Command::Publish(event))) => {
                warn!(
                    topic = %event.topic,
                    delivery_id = ?event.delivery_id,
                    "amqp_bus_queue_full"
                );
                false
            }
            Err(_) => {
                warn!("amqp_bus_closed");
                false
            }
        }
    }
}

impl EventBus for AmqpBus {
    fn register(&self, pattern: TopicPattern) {
        info!(binding_key = %pattern.amqp_binding_key(), "amqp_bus_pattern_registered");
        self.registered.insert(pattern);
    }

    fn emit(&self, event: DispatchedEvent) {
        self.enqueue(event);
    }
}

/// Owns the RabbitMQ connection; lives inside the publisher task.
struct Publisher {
    url: String,
    exchange: String,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl Publisher {
    fn new(url: String, exchange: String) -> Self {
        Self {
            url,
            exchange,
            connection: None,
            channel: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Publish(event) => {
                    if let Err(e) = self.publish(&event).await {
                        warn!(
                            error = %e,
                            topic = %event.topic,
                            delivery_id = ?event.delivery_id,
                            "amqp_publish_failed"
                        );
                        // Force a reconnect on the next event
                        self.channel = None;
                        self.connection = None;
                    }
                }
                Command::Close(ack) => {
                    self.close().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }

        self.close().await;
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&mut self) -> Result<Channel> {
        if let Some(ch) = self.channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("amqp_publisher_connecting");

        let conn = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("amqp_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        // Idempotent
        ch.exchange_declare(
            &self.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare exchange")?;

        info!(exchange = %self.exchange, "amqp_exchange_declared");

        self.connection = Some(conn);
        self.channel = Some(ch.clone());

        Ok(ch)
    }

    async fn publish(&mut self, event: &DispatchedEvent) -> Result<()> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(event.payload.as_ref()).context("Failed to serialize payload")?;
        let routing_key = routing_key(&event.topic);

        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // Persistent
            .with_content_type("application/json".into());
        if let Some(delivery_id) = &event.delivery_id {
            properties = properties.with_message_id(delivery_id.clone().into());
        }

        channel
            .basic_publish(
                &self.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .context("Failed to publish event")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            exchange = %self.exchange,
            routing_key = %routing_key,
            body_length = body.len(),
            "amqp_event_published"
        );

        Ok(())
    }

    async fn close(&mut self) {
        if let Some(ch) = self.channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_channel_close_error");
            }
        }

        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_connection_close_error");
            }
        }

        info!("amqp_publisher_closed");
    }
}
