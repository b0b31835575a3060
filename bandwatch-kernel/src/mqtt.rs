use crate::config::MqttConf;
use crate::health::HealthTracker;
use bandwatch_core::AlertPublisher;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;
use tracing::{info, warn};

/// Client MQTT partagé (alertes + health)
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl AlertPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Crée le client et spawn la task qui pilote l'event loop.
/// Les erreurs de connexion ne sont jamais fatales : on retente toutes les 2s.
pub fn connect(conf: &MqttConf, health: HealthTracker) -> MqttPublisher {
    let mut opts = MqttOptions::new("bandwatch-kernel", &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);
    health.mark_mqtt_connecting();
    info!("Connecting to MQTT broker {}:{}", conf.host, conf.port);

    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("MQTT connected");
                    health.mark_mqtt_connected();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT error: {:?}", e);
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    MqttPublisher { client }
}
