/*!
Faux site HTTP pour tester les sondes sans réseau

Sert un code de statut fixe sur 127.0.0.1 (port éphémère), avec délai
optionnel, et compte les requêtes reçues.
*/

use anyhow::Result;
use axum::http::StatusCode;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serveur stub; arrêté au drop
pub struct StubSite {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubSite {
    pub async fn spawn(status: u16) -> Result<Self> {
        Self::spawn_with_delay(status, Duration::ZERO).await
    }

    /// Répond `status` à toute requête, après `delay`
    pub async fn spawn_with_delay(status: u16, delay: Duration) -> Result<Self> {
        let status = StatusCode::from_u16(status)?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (status, "stub")
            }
        });

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("⚠️ Stub site {} stopped: {}", addr, e);
            }
        });

        log::info!("🌐 Stub site on {} answering {}", addr, status);
        Ok(Self { addr, hits, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port`, usable as a site domain / certificate name
    pub fn domain(&self) -> String {
        self.addr.to_string()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubSite {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Adresse locale sur laquelle plus personne n'écoute (connexion refusée)
pub fn refused_address() -> std::io::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.local_addr()
}

/// Client HTTP qui ignore les proxies de l'environnement (cibles 127.0.0.1)
pub fn local_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().no_proxy().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_answers_configured_status() {
        let stub = StubSite::spawn(404).await.unwrap();
        let client = local_client().unwrap();

        let response = client
            .get(format!("http://{}/any/path", stub.domain()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(stub.hits(), 1);
    }

    #[tokio::test]
    async fn test_refused_address() {
        let addr = refused_address().unwrap();
        let result = local_client()
            .unwrap()
            .get(format!("http://{addr}"))
            .send()
            .await;
        assert!(result.is_err());
    }
}
