//! Spins the HTTP surface up on an ephemeral port for contract tests.

use reqwest::{Method, Response};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use workqueue::http::{self, AGENT_HEADER};

use crate::test_helpers::{harness, Harness};

/// Running server plus the harness that backs it.
pub struct TestServer {
    pub harness: Harness,
    base_url: String,
    client: reqwest::Client,
    ct: CancellationToken,
}

impl TestServer {
    /// Start a server over a fresh harness.
    pub async fn start() -> Self {
        let harness = harness().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let ct = CancellationToken::new();
        tokio::spawn(http::serve(harness.app_state(), listener, ct.clone()));

        Self {
            harness,
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            ct,
        }
    }

    /// Send `body` as `agent`; `None` omits the agent header.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        agent: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(agent) = agent {
            request = request.header(AGENT_HEADER, agent);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("http request")
    }

    pub async fn get(&self, path: &str, agent: &str) -> Response {
        self.send(Method::GET, path, Some(agent), None).await
    }

    pub async fn post(&self, path: &str, agent: &str, body: Value) -> Response {
        self.send(Method::POST, path, Some(agent), Some(body)).await
    }

    pub async fn put(&self, path: &str, agent: &str, body: Value) -> Response {
        self.send(Method::PUT, path, Some(agent), Some(body)).await
    }

    pub async fn patch(&self, path: &str, agent: &str, body: Value) -> Response {
        self.send(Method::PATCH, path, Some(agent), Some(body)).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Decode a JSON response body.
pub async fn body(response: Response) -> Value {
    response.json().await.expect("json body")
}
