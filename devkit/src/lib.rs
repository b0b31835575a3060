/*!
# Bandwatch DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du cœur de surveillance avec:
- Client MQTT factice (publication d'alertes sans broker)
- Sampler scripté et sink défaillant
- Harness prêt à l'emploi (sink en mémoire, ticks rapides)
*/

pub mod fixtures;
pub mod mqtt_stub;
pub mod test_utils;

pub use fixtures::{FailingStore, ScriptedSampler};
pub use mqtt_stub::MockMqttClient;
pub use test_utils::TestHarness;
