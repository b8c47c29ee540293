//! Model Client (§4.4): HTTP bridge to the external prediction endpoint.
//!
//! Every failure mode — timeout, transport error, malformed body, or the
//! model being disabled by config — degrades to a neutral `0.0` probability
//! rather than propagating an error. The pipeline treats a non-answering
//! model exactly like an abstention.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn predict(&self, features: &[f64]) -> f64;
    async fn is_healthy(&self) -> bool;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64],
}

#[derive(Deserialize)]
struct PredictResponse {
    fraud_probability: f64,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// Reqwest-backed client for the model's HTTP surface (§6.3).
pub struct HttpModelClient {
    http: Client,
    endpoint: String,
    enabled: bool,
}

impl HttpModelClient {
    pub fn new(endpoint: String, timeout: Duration, enabled: bool) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            enabled,
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn predict(&self, features: &[f64]) -> f64 {
        if !self.enabled {
            return 0.0;
        }

        let url = format!("{}/predict", self.endpoint);
        let result = self
            .http
            .post(&url)
            .json(&PredictRequest { features })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<PredictResponse>().await {
                    Ok(body) => body.fraud_probability.clamp(0.0, 1.0),
                    Err(e) => {
                        warn!(error = %e, "model response malformed, treating as abstention");
                        0.0
                    }
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "model returned non-success status");
                0.0
            }
            Err(e) => {
                warn!(error = %e, "model call failed, treating as abstention");
                0.0
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let url = format!("{}/health", self.endpoint);
        match self.http.get(&url).send().await {
            Ok(resp) => match resp.json::<HealthResponse>().await {
                Ok(body) => body.status == "UP",
                Err(_) => false,
            },
            Err(e) => {
                warn!(error = %e, "health probe failed");
                false
            }
        }
    }
}

/// Fixed-answer stand-in for tests; never touches the network.
pub struct FakeModelClient {
    pub probability: f64,
    pub healthy: bool,
}

impl FakeModelClient {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            healthy: true,
        }
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn predict(&self, _features: &[f64]) -> f64 {
        self.probability
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }
}
