//! MQTT implementation of the device transport
use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use url::Url;

use super::{Channel, QualityLevel, Topics, Transport};
use crate::config::MqttSettings;
use crate::error::TransportError;

const DEFAULT_MQTT_PORT: u16 = 1883;
const REQUEST_CAPACITY: usize = 64;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

impl From<QualityLevel> for QoS {
    fn from(quality: QualityLevel) -> Self {
        match quality {
            QualityLevel::FireAndForget => QoS::AtMostOnce,
            QualityLevel::AtLeastOnce => QoS::AtLeastOnce,
        }
    }
}

/// Split a broker URL such as `mqtt://localhost:1883` into host and port
pub fn broker_address(broker_url: &str) -> Result<(String, u16), TransportError> {
    let url = Url::parse(broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerUrl(broker_url.to_string()))?;

    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

/// Connected MQTT session subscribed to the device's command topic.
///
/// The rumqttc event loop runs on its own task. Inbound command payloads and
/// PubAck packet ids are forwarded to the session over channels.
pub struct MqttTransport {
    client: AsyncClient,
    topics: Topics,
    inbound: UnboundedReceiver<Vec<u8>>,
    acks: UnboundedReceiver<u16>,
    ack_timeout: Duration,
    driver: JoinHandle<()>,
}

impl MqttTransport {
    /// Connect, subscribe to the command topic and wait for both to be
    /// confirmed by the broker
    pub async fn connect(settings: &MqttSettings, topics: Topics) -> Result<Self, TransportError> {
        let (host, port) = broker_address(&settings.broker_url)?;

        let mut options = MqttOptions::new(settings.client_id.clone(), host.clone(), port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &settings.username {
            let password = settings.password.clone().unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let command_topic = topics.topic(Channel::Command);

        let handshake = async {
            wait_for(&mut eventloop, |p| matches!(p, Packet::ConnAck(_))).await?;
            client
                .subscribe(command_topic.clone(), QoS::AtLeastOnce)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            wait_for(&mut eventloop, |p| matches!(p, Packet::SubAck(_))).await
        };
        timeout(settings.connect_timeout, handshake)
            .await
            .map_err(|_| TransportError::Connect(format!("{}:{} did not answer", host, port)))??;

        info!("Connected to MQTT broker {}:{} as '{}'", host, port, settings.client_id);
        info!("Subscribed to: {}", command_topic);

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (ack_tx, acks) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(eventloop, command_topic, inbound_tx, ack_tx));

        Ok(MqttTransport {
            client,
            topics,
            inbound,
            acks,
            ack_timeout: settings.ack_timeout,
            driver,
        })
    }

    async fn wait_for_ack(&mut self) -> Result<(), TransportError> {
        match timeout(self.ack_timeout, self.acks.recv()).await {
            Ok(Some(pkid)) => {
                debug!("PubAck for packet {}", pkid);
                Ok(())
            }
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::AckTimeout(self.ack_timeout)),
        }
    }
}

async fn wait_for(
    eventloop: &mut EventLoop,
    expected: fn(&Packet) -> bool,
) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(packet)) if expected(&packet) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

/// Poll the event loop until disconnect or a connection error
async fn drive(
    mut eventloop: EventLoop,
    command_topic: String,
    inbound: UnboundedSender<Vec<u8>>,
    acks: UnboundedSender<u16>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic == command_topic {
                    let _ = inbound.send(publish.payload.to_vec());
                } else {
                    debug!("Ignoring message on unexpected topic {}", publish.topic);
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = acks.send(ack.pkid);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &mut self,
        channel: Channel,
        quality: QualityLevel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let topic = self.topics.topic(channel);

        // Only one acknowledged publish is ever in flight, so the next PubAck
        // belongs to it. Anything already queued is stale.
        if quality == QualityLevel::AtLeastOnce {
            while self.acks.try_recv().is_ok() {}
        }

        self.client
            .publish(topic.clone(), quality.into(), false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic,
                reason: e.to_string(),
            })?;

        match quality {
            QualityLevel::AtLeastOnce => self.wait_for_ack().await,
            QualityLevel::FireAndForget => Ok(()),
        }
    }

    async fn receive(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match timeout(wait, self.inbound.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let requested = self
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()));

        if timeout(DISCONNECT_GRACE, &mut self.driver).await.is_err() {
            self.driver.abort();
        }
        requested
    }
}
