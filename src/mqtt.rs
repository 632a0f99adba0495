use crate::coordinator::PollStats;
use crate::prelude::*;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Publish, QoS};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn json<T: serde::Serialize>(topic: String, value: &T, retain: bool) -> Result<Self> {
        Ok(Self {
            topic,
            retain,
            payload: serde_json::to_string(value)?,
        })
    }

    pub fn is_homeassistant_online(&self, prefix: &str) -> bool {
        self.topic == format!("{}/status", prefix) && self.payload.trim() == "online"
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    /// Published under the configured namespace.
    Message(Message),
    /// Published to the topic as given, used for Home Assistant discovery.
    Discovery(Message),
    Shutdown,
}

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels, shared_stats: Arc<Mutex<PollStats>>) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = &self.config;

        if !c.mqtt().enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new(
            format!("pylontech-bridge-{}", c.mqtt().namespace()),
            c.mqtt().host(),
            c.mqtt().port(),
        );

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.mqtt().username(), c.mqtt().password()) {
            options.set_credentials(u, p);
        }

        info!(
            "initializing mqtt at {}:{}",
            c.mqtt().host(),
            c.mqtt().port()
        );

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(self.receiver(client.clone(), eventloop), self.sender(client))?;

        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    // runs on every (re)connect, so it must not wait on the event loop
    fn setup(&self, client: &AsyncClient) -> Result<()> {
        client.try_publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")?;

        if self.config.homeassistant_enabled() {
            client.try_subscribe(
                format!("{}/status", self.config.mqtt().homeassistant().prefix()),
                QoS::AtMostOnce,
            )?;
        }

        Ok(())
    }

    // mqtt -> publisher
    async fn receiver(&self, client: AsyncClient, mut eventloop: EventLoop) -> Result<()> {
        let mut shutdown = self.channels.to_mqtt.subscribe();

        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("mqtt connected");
                        if let Err(e) = self.setup(&client) {
                            error!("mqtt setup failed: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        self.handle_message(publish);
                    }
                    Err(e) => {
                        error!("{}", e);
                        info!("reconnecting in 5s");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => {} // keepalives etc
                },
                message = shutdown.recv() => {
                    if matches!(message, Ok(ChannelData::Shutdown) | Err(RecvError::Closed)) {
                        break;
                    }
                }
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    // bad input from the broker is dropped, never fatal to the receiver
    fn handle_message(&self, publish: Publish) {
        // remove the namespace, including the first /
        // doing it this way means we don't break if namespace happens to contain a /
        let namespace = self.config.mqtt().namespace();
        let topic = match publish.topic.strip_prefix(namespace) {
            Some(rest) if rest.starts_with('/') => rest[1..].to_owned(),
            _ => publish.topic.clone(),
        };

        let payload = match String::from_utf8(publish.payload.to_vec()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("ignoring non UTF-8 payload on {}: {}", publish.topic, e);
                return;
            }
        };

        let message = Message {
            topic,
            retain: publish.retain,
            payload,
        };
        debug!("RX: {:?}", message);
        if self
            .channels
            .from_mqtt
            .send(ChannelData::Message(message))
            .is_err()
        {
            // nobody listening, the publisher may not be running yet
            debug!("send(from_mqtt) failed - channel closed?");
        }
    }

    // publisher -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        use ChannelData::*;

        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            let (topic, message) = match receiver.recv().await {
                Ok(Shutdown) | Err(RecvError::Closed) => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client
                        .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "offline")
                        .await;
                    let _ = client.disconnect().await;
                    break;
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("MQTT sender lagged, dropped {} messages", n);
                    continue;
                }
                Ok(Message(message)) => (
                    format!("{}/{}", self.config.mqtt().namespace(), message.topic),
                    message,
                ),
                Ok(Discovery(message)) => (message.topic.clone(), message),
            };

            debug!("publishing: {} = {}", topic, message.payload);
            match client
                .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload.into_bytes())
                .await
            {
                Ok(_) => {
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_messages_sent += 1;
                    }
                }
                Err(err) => {
                    error!("MQTT publish to {} failed: {:?}", topic, err);
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_errors += 1;
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
