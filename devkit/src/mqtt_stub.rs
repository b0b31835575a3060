/*!
Mock MQTT Client pour tester la publication des alertes sans broker

Enregistre tous les messages publiés. Peut simuler une coupure du broker
pour vérifier que le forwarder survit aux échecs de publication.
*/

use anyhow::Result;
use bandwatch_core::AlertPublisher;
use parking_lot::Mutex;
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    offline: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simule une coupure (true) ou un retour (false) du broker
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let topic = topic.into();
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("broker unreachable, dropping message on {}", topic);
        }

        let message = MockMessage {
            topic,
            payload: payload.into(),
            qos,
            retain,
        };
        tracing::info!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().push(message);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }
}

impl AlertPublisher for MockMqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        MockMqttClient::publish(self, topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_records_messages() {
        let client = MockMqttClient::new();
        client
            .publish("bandwatch/alerts", QoS::AtLeastOnce, false, b"{\"a\":1}".to_vec())
            .await
            .unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "bandwatch/alerts");

        let parsed: Option<serde_json::Value> = client.get_last_json_message("bandwatch/alerts").unwrap();
        assert_eq!(parsed.unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn test_offline_client_rejects_publish() {
        let client = MockMqttClient::new();
        client.set_offline(true);
        let res = AlertPublisher::publish(&client, "t", b"x".to_vec()).await;
        assert!(res.is_err());
        assert!(client.get_published_messages().is_empty());

        client.set_offline(false);
        AlertPublisher::publish(&client, "t", b"x".to_vec()).await.unwrap();
        assert_eq!(client.find_messages_by_topic("t").len(), 1);
    }

    #[tokio::test]
    async fn test_alerts_are_published_at_least_once_without_retain() {
        let client = MockMqttClient::new();
        AlertPublisher::publish(&client, "bandwatch/alerts", b"{}".to_vec()).await.unwrap();

        let sent = &client.get_published_messages()[0];
        assert_eq!(sent.qos, QoS::AtLeastOnce);
        assert!(!sent.retain);
    }
}
