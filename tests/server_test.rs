//! Integration tests for the onewired HTTP query service

#[cfg(feature = "server")]
mod server_tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use onewired::core::{HistoryRegistry, HistorySettings, SharedHistory};
    use onewired::server::{run, ServerConfig};
    use onewired::stats::create_shared_stats;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    async fn start(history: SharedHistory) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let config = ServerConfig::new("127.0.0.1", 0);
        let server = run(config, history, create_shared_stats())
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        server
    }

    fn history_with_data() -> SharedHistory {
        let history = Arc::new(HistoryRegistry::new(HistorySettings::default()));
        let now = Utc::now();
        // One point per minute, newest first: 1.0 now, 2.0 a minute ago, ...
        for i in (0..10i64).rev() {
            history.record(
                "office",
                (i + 1) as f64,
                now - ChronoDuration::minutes(i),
            );
        }
        history.record("attic", 95.5, now - ChronoDuration::minutes(30));
        history
    }

    async fn get_text(addr: SocketAddr, path: &str) -> String {
        reqwest::get(format!("http://{}{}", addr, path))
            .await
            .expect("Failed to send request")
            .text()
            .await
            .expect("Failed to read body")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(history_with_data()).await;

        let response = reqwest::get(format!("http://{}/health", addr))
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
        assert!(body["instance_id"].as_str().is_some());
        assert_eq!(body["locations"], serde_json::json!(["attic", "office"]));
        assert_eq!(body["stats"]["cycles_polled"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_banner() {
        let (addr, shutdown_tx) = start(history_with_data()).await;
        assert_eq!(get_text(addr, "/").await, "OneWireD");
        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_current_and_average() {
        let (addr, shutdown_tx) = start(history_with_data()).await;

        assert_eq!(get_text(addr, "/temp/office/current").await, "1.0");
        // The five-minute-old point has aged past the window by query time: 1..=5
        assert_eq!(get_text(addr, "/temp/office/average").await, "3.0");
        // Lookups ignore case.
        assert_eq!(get_text(addr, "/temp/Office/current").await, "1.0");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_none_for_unknown_or_stale() {
        let (addr, shutdown_tx) = start(history_with_data()).await;

        assert_eq!(get_text(addr, "/temp/garage/current").await, "NONE");
        assert_eq!(get_text(addr, "/temp/garage/average").await, "NONE");
        // Known, but its only point is 30 minutes old.
        assert_eq!(get_text(addr, "/temp/attic/current").await, "NONE");
        assert_eq!(get_text(addr, "/temp/attic/average").await, "NONE");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_location_list() {
        let (addr, shutdown_tx) = start(history_with_data()).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/temp", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(
            body,
            serde_json::json!([
                { "location": "attic", "current": null },
                { "location": "office", "current": 1.0 },
            ])
        );

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start(history_with_data()).await;

        let client = reqwest::Client::new();
        let response = client
            .request(
                reqwest::Method::OPTIONS,
                format!("http://{}/temp/office/current", addr),
            )
            .header("Origin", "http://dashboard.local")
            .header("Access-Control-Request-Method", "GET")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success(),
            "CORS preflight failed: {}",
            response.status()
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );

        let _ = shutdown_tx.send(());
    }
}
