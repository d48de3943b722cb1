/*!
Test Harness pour l'exporter de sites Symbion

Regroupe pour les tests de bout en bout:
- Une arborescence d'hébergement temporaire
- Des faux sites HTTP gardés en vie pendant le test
- Le scrape et les assertions sur l'exposition
*/

use crate::fixtures::SiteTree;
use crate::http_stub::StubSite;
use crate::scrape::Scrape;
use anyhow::{bail, Result};
use std::net::SocketAddr;

pub struct TestHarness {
    pub tree: SiteTree,
    stubs: Vec<StubSite>,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Result<Self> {
        env_logger::builder().is_test(true).try_init().ok(); // Init logging pour tests

        Ok(Self {
            tree: SiteTree::new()?,
            stubs: Vec::new(),
        })
    }

    /// Démarre un faux site et renvoie son domaine (`127.0.0.1:port`)
    pub async fn stub_site(&mut self, status: u16) -> Result<String> {
        let stub = StubSite::spawn(status).await?;
        let domain = stub.domain();
        self.stubs.push(stub);
        Ok(domain)
    }

    /// Nombre de requêtes reçues par le faux site `domain`
    pub fn stub_hits(&self, domain: &str) -> usize {
        self.stubs
            .iter()
            .find(|s| s.domain() == domain)
            .map(StubSite::hits)
            .unwrap_or(0)
    }

    /// Scrape l'endpoint metrics servi sur `addr`
    pub async fn scrape(&self, addr: SocketAddr) -> Result<Scrape> {
        let scrape = Scrape::fetch(&format!("http://{addr}/metrics")).await?;
        log::info!("📊 Scraped {}", addr);
        Ok(scrape)
    }

    /// Vérifie qu'une gauge est présente et vaut 0 ou 1
    pub fn assert_boolean_gauge(scrape: &Scrape, name: &str, labels: &[(&str, &str)]) -> Result<f64> {
        match scrape.value(name, labels) {
            Some(v) if v == 0.0 || v == 1.0 => Ok(v),
            Some(v) => bail!("{name}{labels:?} = {v}, expected 0 or 1"),
            None => bail!("{name}{labels:?} missing from scrape"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let mut harness = TestHarness::new().unwrap();
        let domain = harness.stub_site(200).await.unwrap();

        let status = crate::http_stub::local_client()
            .unwrap()
            .get(format!("http://{domain}"))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 200);
        assert_eq!(harness.stub_hits(&domain), 1);
        assert_eq!(harness.stub_hits("127.0.0.1:1"), 0);
    }

    #[test]
    fn test_boolean_gauge_assertion() {
        let scrape = Scrape::parse("up 1\nhalf 0.5\n").unwrap();
        assert_eq!(TestHarness::assert_boolean_gauge(&scrape, "up", &[]).unwrap(), 1.0);
        assert!(TestHarness::assert_boolean_gauge(&scrape, "half", &[]).is_err());
        assert!(TestHarness::assert_boolean_gauge(&scrape, "missing", &[]).is_err());
    }
}
