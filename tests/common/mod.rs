//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use crm_bridge::config::schema::TokenConfig;
use crm_bridge::config::BridgeConfig;
use crm_bridge::http::HttpServer;
use crm_bridge::lifecycle::Shutdown;
use crm_bridge::pipeline::{BridgeComponents, Dispatched, QueueDispatcher};
use crm_bridge::security::auth::hash_token_secret;
use crm_bridge::security::signature::compute_signature;
use crm_bridge::time::ManualClock;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const NOW: i64 = 1_700_000_000;
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const ADMIN_KEY: &str = "admin-integration-key";

/// `1|reader`: reads consents and conversations.
pub const READER_TOKEN: &str = "1|reader-secret";
/// `2|officer`: every LGPD ability.
pub const OFFICER_TOKEN: &str = "2|officer-secret";
/// `3|expired`: expired before `NOW`.
pub const EXPIRED_TOKEN: &str = "3|expired-secret";

/// A running bridge bound to an ephemeral port.
pub struct TestBridge {
    pub base: String,
    pub addr: SocketAddr,
    pub clock: ManualClock,
    pub shutdown: Shutdown,
    pub events: mpsc::Receiver<Dispatched>,
    pub client: reqwest::Client,
}

impl TestBridge {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Events handed to the dispatcher so far.
    pub fn drain_events(&mut self) -> Vec<Dispatched> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn post_webhook(&self, body: &[u8], secret: &str, timestamp: i64) -> reqwest::Response {
        let timestamp = timestamp.to_string();
        let signature = compute_signature(secret.as_bytes(), &timestamp, body);
        self.client
            .post(self.url("/api/webhooks/chatwoot"))
            .header("content-type", "application/json")
            .header("x-timestamp", timestamp)
            .header("x-signature", format!("sha256={signature}"))
            .body(body.to_vec())
            .send()
            .await
            .unwrap()
    }

    pub async fn admin_get(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .bearer_auth(ADMIN_KEY)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.webhook.secret = WEBHOOK_SECRET.to_string();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.auth.tokens = vec![
        token(1, "user-reader", "reader-secret", &["lgpd:read", "conversations:read"], None),
        token(2, "user-officer", "officer-secret", &["lgpd:*"], None),
        token(3, "user-expired", "expired-secret", &["*"], Some(NOW - 10)),
    ];
    config
}

fn token(id: u64, principal: &str, secret: &str, abilities: &[&str], expires_at: Option<i64>) -> TokenConfig {
    TokenConfig {
        id,
        principal: principal.to_string(),
        token_sha256: hash_token_secret(secret),
        abilities: abilities.iter().map(|a| a.to_string()).collect(),
        expires_at,
    }
}

/// Start the real server with a manual clock and an in-process queue.
pub async fn start_bridge(config: BridgeConfig) -> TestBridge {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let clock = ManualClock::new(NOW);
    let components = BridgeComponents::in_memory(&config, Arc::new(clock.clone()));
    let (dispatcher, events) = QueueDispatcher::channel(64);
    let server = HttpServer::from_parts(config, components, Arc::new(dispatcher));

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestBridge {
        base: format!("http://{addr}"),
        addr,
        clock,
        shutdown,
        events,
        client: reqwest::Client::builder().no_proxy().build().unwrap(),
    }
}
