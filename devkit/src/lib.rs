/*!
# Symbion DevKit - Outils de test pour l'exporter de sites

Bibliothèque facilitant les tests de l'exporter avec:
- Arborescences ISPConfig temporaires (clients, sites, certificats)
- Faux sites HTTP locaux pour les sondes de disponibilité
- Parsing du format texte Prometheus pour les assertions
*/

pub mod fixtures;
pub mod http_stub;
pub mod scrape;
pub mod test_utils;

pub use fixtures::{SiteBuilder, SiteTree};
pub use http_stub::StubSite;
pub use scrape::{Sample, Scrape};
pub use test_utils::TestHarness;
