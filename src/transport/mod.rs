pub mod mqtt;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;

pub use mqtt::MqttTransport;

/// Logical channels of one device, each mapped to its own topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Telemetry,
    Accel,
    Baseline,
    Command,
}

impl Channel {
    fn suffix(self) -> &'static str {
        match self {
            Channel::Telemetry => "telemetry",
            Channel::Accel => "accel",
            Channel::Baseline => "baseline",
            Channel::Command => "command",
        }
    }
}

/// Delivery guarantee of a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    /// No acknowledgment, the sender does not wait
    FireAndForget,
    /// The sender blocks until the broker confirms delivery
    AtLeastOnce,
}

/// Per-device topic namespace: `helmet/<device_id>/<channel>`
#[derive(Debug, Clone)]
pub struct Topics {
    device_id: String,
}

impl Topics {
    pub fn new(device_id: &str) -> Self {
        Topics {
            device_id: device_id.to_string(),
        }
    }

    pub fn topic(&self, channel: Channel) -> String {
        format!("helmet/{}/{}", self.device_id, channel.suffix())
    }
}

/// Publish/subscribe boundary used by the device session
#[async_trait]
pub trait Transport: Send {
    /// Publish a payload. With `AtLeastOnce` this returns only after the
    /// broker acknowledged it, or fails with `AckTimeout`.
    async fn publish(
        &mut self,
        channel: Channel,
        quality: QualityLevel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Wait at most `wait` for the next command message
    async fn receive(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release the connection
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
