use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::AssetId;

/// One queued outbound command, answered with a success flag once the
/// listener has attempted the publish
#[derive(Debug)]
pub struct OutboundCommand {
    pub asset_id: AssetId,
    pub command: String,
    pub parameters: serde_json::Value,
    pub(crate) done: oneshot::Sender<bool>,
}

/// Cloneable handle for the outbound command path. Commands are routed
/// through the listener loop so the broker session keeps a single owner;
/// see [`MqttListener`](crate::MqttListener).
#[derive(Debug, Clone)]
pub struct CommandClient {
    sender: UnboundedSender<OutboundCommand>,
}

impl CommandClient {
    pub(crate) fn new(sender: UnboundedSender<OutboundCommand>) -> Self {
        Self { sender }
    }

    /// Publish a command message to `{prefix}/assets/{id}/commands`.
    /// Returns whether the publish was handed to the broker.
    pub async fn send_command(
        &self,
        asset_id: AssetId,
        command: &str,
        parameters: serde_json::Value,
    ) -> bool {
        let (done, outcome) = oneshot::channel();
        let queued = self.sender.send(OutboundCommand {
            asset_id,
            command: command.to_string(),
            parameters,
            done,
        });
        if queued.is_err() {
            log::warn!("Command for asset {asset_id} dropped, listener is gone");
            return false;
        }
        outcome.await.unwrap_or(false)
    }

    /// Convenience wrapper asking the asset's devices for a full data
    /// refresh
    pub async fn request_asset_data(&self, asset_id: AssetId) -> bool {
        self.send_command(asset_id, "request_data", serde_json::json!({}))
            .await
    }
}
