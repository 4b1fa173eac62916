//! Request/response RPC client for the HTTP plane.
//!
//! Every call carries an explicit deadline; transient failures are retried a
//! bounded number of times with exponential backoff and jitter, then surfaced
//! to the one caller waiting on the operation. Connection pooling per remote
//! endpoint is delegated to the shared `reqwest` client.

use super::protocol::{
    JoinMessage, JoinResponse, ProbeMessage, ProbeResponse, ENDPOINT_JOIN,
    ENDPOINT_JOIN_PHASE2, ENDPOINT_PROBE, HTTP_PORT_OFFSET,
};
use crate::membership::types::{Endpoint, Settings};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub struct RpcClient {
    http: reqwest::Client,
    settings: Settings,
}

fn http_url(remote: &Endpoint, path: &str) -> String {
    format!(
        "http://{}:{}{}",
        remote.host,
        remote.port + HTTP_PORT_OFFSET,
        path
    )
}

impl RpcClient {
    pub fn new(settings: Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Join phase 1 against the seed. Uses a stretched deadline because the
    /// seed computes the joiner's observer set under its protocol loop.
    pub async fn send_join_phase1(
        &self,
        seed: &Endpoint,
        msg: &JoinMessage,
    ) -> Result<JoinResponse> {
        self.post_with_retry(
            http_url(seed, ENDPOINT_JOIN),
            msg,
            self.settings.rpc_timeout * 5,
            self.settings.rpc_retries,
        )
        .await
    }

    /// Join phase 2 against one observer. The observer parks the response
    /// until the next configuration commits, so the deadline is generous.
    pub async fn send_join_phase2(
        &self,
        observer: &Endpoint,
        msg: &JoinMessage,
    ) -> Result<JoinResponse> {
        self.post_with_retry(
            http_url(observer, ENDPOINT_JOIN_PHASE2),
            msg,
            self.settings.join_phase2_timeout,
            self.settings.rpc_retries,
        )
        .await
    }

    /// One failure-detector probe. No retries: the detector counts
    /// consecutive failures itself.
    pub async fn probe(&self, remote: &Endpoint, msg: &ProbeMessage) -> Result<ProbeResponse> {
        let response = self
            .http
            .post(http_url(remote, ENDPOINT_PROBE))
            .json(msg)
            .timeout(self.settings.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Probe failed: {}", response.status()));
        }
        Ok(response.json().await?)
    }

    async fn post_with_retry<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        payload: &Req,
        timeout: Duration,
        attempts: usize,
    ) -> Result<Resp> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http
                .post(url.clone())
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.json().await?);
                }
                Ok(resp) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!("RPC failed: {}", resp.status()));
                    }
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                }
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_applies_port_offset() {
        let remote = Endpoint::new("10.1.2.3", 5000);
        assert_eq!(
            http_url(&remote, ENDPOINT_PROBE),
            "http://10.1.2.3:6000/membership/probe"
        );
    }
}
