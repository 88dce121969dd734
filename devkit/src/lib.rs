/*!
# Fakeuser DevKit - Doublures et utilitaires de test

Outils pour tester le rejeu sans UserCenter réel :
- `FakeUserCenter` : serveur axum local qui joue le UserCenter et toutes les instances
- `MemoryTimeline` / `MemorySink` : historique et enregistrements en mémoire
- `TestHarness` : câble le tout sur un vrai `HttpTransport`
*/

pub mod fake_usercenter;
pub mod memory;
pub mod test_utils;

pub use fake_usercenter::{FakeUserCenter, Hits};
pub use memory::{MemorySink, MemoryTimeline};
pub use test_utils::TestHarness;
