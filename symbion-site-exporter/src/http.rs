/**
 * ENDPOINT METRICS - Exposition Prometheus de l'exporter
 *
 * RÔLE :
 * Sert les gauges sites/services au format texte Prometheus pour le scraper.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum (port 8003 par défaut), sans auth ni TLS
 * - GET /metrics, et toute autre route répond la même exposition
 * - Lecture seule : les valeurs sont écrites par la boucle de collecte
 */

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use crate::metrics::SiteMetrics;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<SiteMetrics>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .fallback(metrics_handler)
        .with_state(app_state)
}

/// Sert le routeur jusqu'à erreur fatale du listener
pub async fn serve(listener: TcpListener, app_state: AppState) -> std::io::Result<()> {
    axum::serve(listener, build_router(app_state)).await
}

// GET /metrics
async fn metrics_handler(State(app): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    match app.metrics.encode() {
        Ok(body) => Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body)),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{APACHE_UP, DISK_USAGE};
    use crate::probes::ProbeOutcome;
    use symbion_devkit::http_stub::local_client;
    use symbion_devkit::Scrape;

    async fn spawn_endpoint(metrics: Arc<SiteMetrics>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, AppState { metrics }));
        addr
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let metrics = Arc::new(SiteMetrics::new().unwrap());
        metrics.publish_disk_usage("example.org", ProbeOutcome::Measured(512));
        let addr = spawn_endpoint(metrics).await;

        let response = local_client()
            .unwrap()
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));

        let scrape = Scrape::parse(&response.text().await.unwrap()).unwrap();
        assert_eq!(scrape.value(DISK_USAGE, &[("site", "example.org")]), Some(512.0));
        assert!(scrape.value(APACHE_UP, &[]).is_some());
    }

    #[tokio::test]
    async fn test_any_path_serves_metrics() {
        let metrics = Arc::new(SiteMetrics::new().unwrap());
        let addr = spawn_endpoint(metrics).await;

        for path in ["", "/", "/anything/else"] {
            let scrape = Scrape::fetch(&format!("http://{addr}{path}")).await.unwrap();
            assert!(scrape.value(APACHE_UP, &[]).is_some(), "no exposition at {path:?}");
        }
    }
}
