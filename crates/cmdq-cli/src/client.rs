use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cmdq_protocol::{Entity, ErrorBody, RequestEnvelope, ResponseEnvelope};
use serde::de::DeserializeOwned;

use crate::opts::ClientOpts;

/// Thin HTTP client for a node's `/api` routes.
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(opts: &ClientOpts) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = opts.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(Self {
            base: format!("{}/api", opts.server.trim_end_matches('/')),
            http: builder.build().context("build http client")?,
        })
    }

    pub async fn submit(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let url = format!("{}/ksql", self.base);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        decode(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("decode response body");
    }
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => {
            let code = serde_json::to_value(body.error_code)?;
            let code = code.as_str().unwrap_or("error").to_string();
            let mut message = format!("{status} {code}: {}", body.message);
            for entity in &body.entities {
                if let Entity::CommandStatus(done) = entity {
                    message.push_str(&format!(
                        "\n  completed before the failure: '{}' at offset {}",
                        done.statement_text, done.command_sequence_number
                    ));
                }
            }
            Err(anyhow!(message))
        }
        Err(_) => Err(anyhow!("{status}: {text}")),
    }
}
