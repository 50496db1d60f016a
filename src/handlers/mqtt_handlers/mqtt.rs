use crate::config::MqttConfig;
use crate::handlers::mqtt_handlers::{handle_claim, handle_telemetry};
use log::{debug, error, info, warn};
use mongodb::Database;
use rumqttc::{
    AsyncClient, Event, MqttOptions, NetworkOptions, Packet, QoS, TlsConfiguration, Transport,
};
use std::fs::File;
use std::io::Read;
use std::time::Duration;
use tokio::time::sleep;

pub const TELEMETRY_TOPIC: &str = "devices/+/telemetry";
pub const CLAIM_TOPIC: &str = "devices/+/claim";

const RECONNECT_PERIOD: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, PartialEq)]
pub enum TopicKind {
    Telemetry(String),
    Claim(String),
}

/// Classifies an inbound topic against the two subscribed patterns; the
/// device id is the middle segment. Anything else is dropped by the caller.
pub fn classify_topic(topic: &str) -> Option<TopicKind> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        ["devices", device_id, "telemetry"] if !device_id.is_empty() => {
            Some(TopicKind::Telemetry(device_id.to_string()))
        }
        ["devices", device_id, "claim"] if !device_id.is_empty() => {
            Some(TopicKind::Claim(device_id.to_string()))
        }
        _ => None,
    }
}

/// Broker session: connects, subscribes on every ConnAck (so subscriptions
/// survive reconnects), and feeds each publish through the ingress pipeline.
/// The event loop handles reconnection itself; this task only logs the state
/// transitions and backs off before polling again.
pub async fn run_mqtt(config: MqttConfig, db: Database) {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| "hydroiot-api".to_string());

    let mut options = MqttOptions::new(client_id, config.broker.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive.into()));
    options.set_clean_session(false);

    if let (Some(username), Some(password)) = (config.username.clone(), config.password.clone()) {
        options.set_credentials(username, password);
    }

    // TLS configuration if SSL certificates are provided
    if let (Some(ca_cert), Some(client_cert), Some(client_key)) =
        (&config.ca_cert, &config.client_cert, &config.client_key)
    {
        let ca = load_certificate(ca_cert);
        let client_cert = load_certificate(client_cert);
        let client_key = load_certificate(client_key);

        let tls_config = TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((client_cert, client_key)),
        };

        options.set_transport(Transport::tls_with_config(tls_config));
    }

    let (client, mut eventloop) = AsyncClient::new(options, 250);

    let mut network_options = NetworkOptions::new();
    network_options.set_connection_timeout(CONNECT_TIMEOUT_SECS);
    eventloop.set_network_options(network_options);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("[MQTT] connection established with broker");
                for topic in [TELEMETRY_TOPIC, CLAIM_TOPIC] {
                    match client.subscribe(topic, QoS::AtLeastOnce).await {
                        Ok(()) => info!("[MQTT] subscribed: {}", topic),
                        Err(e) => error!("[MQTT] failed to subscribe to '{}': {}", topic, e),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&db, &publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "[MQTT] connection lost: {}; retrying in {}s",
                    e,
                    RECONNECT_PERIOD.as_secs()
                );
                sleep(RECONNECT_PERIOD).await;
            }
        }
    }
}

/// Per-message entry point. Every failure is terminal for that message —
/// the broker offers no negative-acknowledgement redelivery, so bad input
/// is logged with its topic and dropped.
pub async fn dispatch(db: &Database, topic: &str, payload: &[u8]) {
    match classify_topic(topic) {
        Some(TopicKind::Telemetry(device_id)) => {
            if let Err(e) = handle_telemetry::handle_telemetry(db, &device_id, payload).await {
                warn!("[MQTT] telemetry dropped on '{}': {}", topic, e);
            }
        }
        Some(TopicKind::Claim(device_id)) => {
            if let Err(e) = handle_claim::handle_claim(db, &device_id, payload).await {
                error!("[MQTT] claim failed on '{}': {}", topic, e);
            }
        }
        None => debug!("[MQTT] unhandled topic shape: {}", topic),
    }
}

fn load_certificate(path: &str) -> Vec<u8> {
    let mut file = File::open(path).expect("Failed to open certificate file");
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .expect("Failed to read certificate file");
    buffer
}
