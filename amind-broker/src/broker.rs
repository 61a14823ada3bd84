use rumqttc::{AsyncClient, Event, Packet, Publish, QoS};
use thiserror::Error;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    watch,
};

use crate::{
    CommandClient, CommandMessage, ConfigStore, ConnectError, ConnectionManager, ConnectionStats,
    MessageLog, OutboundCommand, Session, TelemetryMessage, TopicTable,
};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection Error")]
    Connect(#[from] ConnectError),
    #[error("Client Error")]
    Client(#[from] rumqttc::ClientError),
}

enum LoopExit {
    Shutdown,
    ConnectionLost(rumqttc::ConnectionError),
}

/// The listener loop: one long-lived session, subscriptions for all
/// configured topic patterns, and synchronous in-order dispatch of each
/// delivered message into the telemetry channel.
///
/// Per-message failures (unroutable topic, malformed payload, closed
/// channel) are logged and never break the loop; session loss feeds the
/// [`ConnectionManager`] reconnect policy; reconnect exhaustion is the
/// one fatal exit. The shutdown flag is checked every iteration so the
/// daemon can stop the loop cooperatively, letting in-flight dispatch
/// finish before the session is torn down.
pub struct MqttListener {
    manager: ConnectionManager,
    telemetry_tx: UnboundedSender<TelemetryMessage>,
    command_rx: UnboundedReceiver<OutboundCommand>,
    shutdown_rx: watch::Receiver<bool>,
    message_log: MessageLog,
}

impl MqttListener {
    pub fn new(
        store: Box<dyn ConfigStore>,
        telemetry_tx: UnboundedSender<TelemetryMessage>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, CommandClient) {
        let (command_tx, command_rx) = unbounded_channel();
        (
            Self {
                manager: ConnectionManager::new(store),
                telemetry_tx,
                command_rx,
                shutdown_rx,
                message_log: MessageLog::default(),
            },
            CommandClient::new(command_tx),
        )
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.manager.stats()
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.message_log
    }

    pub async fn run(&mut self) -> Result<(), BrokerError> {
        let mut session = match self.manager.connect().await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Initial connect failed: {e:}");
                self.manager.reconnect().await?
            }
        };

        loop {
            let topics = TopicTable::new(&session.config().topic_prefix);
            let client = session.client();
            let qos = session.config().qos();
            Self::subscribe_all(&client, qos, &topics).await?;

            match self.dispatch_loop(&mut session, &topics).await {
                LoopExit::Shutdown => {
                    log::info!("Shutdown requested, closing broker session");
                    session.disconnect().await;
                    return Ok(());
                }
                LoopExit::ConnectionLost(e) => {
                    log::warn!("Broker session lost: {e:}");
                    session.disconnect().await;
                    // fatal once the reconnect policy is exhausted
                    session = self.manager.reconnect().await?;
                }
            }
        }
    }

    async fn subscribe_all(
        client: &AsyncClient,
        qos: QoS,
        topics: &TopicTable,
    ) -> Result<(), BrokerError> {
        for pattern in topics.subscriptions() {
            client.subscribe(&pattern, qos).await?;
            log::debug!("Subscribed to {pattern}");
        }
        Ok(())
    }

    async fn dispatch_loop(&mut self, session: &mut Session, topics: &TopicTable) -> LoopExit {
        let client = session.client();
        let qos = session.config().qos();
        let retain = session.config().retain_commands;

        let Self {
            telemetry_tx,
            command_rx,
            shutdown_rx,
            message_log,
            ..
        } = self;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return LoopExit::Shutdown;
                    }
                }
                Some(cmd) = command_rx.recv() => {
                    publish_command(&client, topics, qos, retain, cmd).await;
                }
                event = session.event_loop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            handle_publish(message_log, telemetry_tx, topics, publish);
                        }
                        Ok(_) => {}
                        Err(e) => return LoopExit::ConnectionLost(e),
                    }
                }
            };
        }
    }
}

fn handle_publish(
    message_log: &mut MessageLog,
    telemetry_tx: &UnboundedSender<TelemetryMessage>,
    topics: &TopicTable,
    publish: Publish,
) {
    // raw copy first, for debugging/replay, regardless of routing outcome
    message_log.push(publish.topic.clone(), publish.payload.to_vec());

    let Some(route) = topics.route(&publish.topic) else {
        log::warn!("Dropping message on unroutable topic {}", publish.topic);
        return;
    };

    match TelemetryMessage::parse(route, &publish.payload) {
        Ok(msg) => {
            if telemetry_tx.send(msg).is_err() {
                log::error!(
                    "Telemetry channel closed, dropping message from {}",
                    publish.topic
                );
            }
        }
        Err(e) => {
            log::warn!("Dropping malformed payload on {}: {e:}", publish.topic);
        }
    }
}

async fn publish_command(
    client: &AsyncClient,
    topics: &TopicTable,
    qos: QoS,
    retain: bool,
    cmd: OutboundCommand,
) {
    let message = CommandMessage {
        command: cmd.command,
        parameters: cmd.parameters,
        issued_at: chrono::Local::now().timestamp(),
    };

    let published = match serde_json::to_vec(&message) {
        Ok(payload) => client
            .publish(topics.command_topic(cmd.asset_id), qos, retain, payload)
            .await
            .map_err(|e| {
                log::error!("Command publish failed for asset {}: {e:}", cmd.asset_id);
            })
            .is_ok(),
        Err(e) => {
            log::error!("Command serialization failed: {e:}");
            false
        }
    };

    cmd.done.send(published).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrokerConfig, StaticConfigStore};

    #[tokio::test]
    async fn command_client_reports_failure_when_listener_gone() {
        let (telemetry_tx, _telemetry_rx) = unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (listener, commands) = MqttListener::new(
            Box::new(StaticConfigStore::new(BrokerConfig::default())),
            telemetry_tx,
            shutdown_rx,
        );
        drop(listener);
        assert!(!commands.send_command(1, "restart", serde_json::json!({})).await);
        assert!(!commands.request_asset_data(1).await);
    }
}
