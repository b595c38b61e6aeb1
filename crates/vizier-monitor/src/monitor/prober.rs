//! Liveness checks against the statusz endpoint of a single pod.

use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use reqwest::StatusCode;
use tracing::debug;
use tracing::info;

use crate::k8s::MonitorError;
use crate::monitor::registry::PodRecord;

/// Status code and, for unsuccessful requests, the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal HTTP client used for probing, so tests can stand in for the
/// network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, Report<MonitorError>>;
}

/// `reqwest` client for in-cluster HTTPS. Pods serve self-signed
/// certificates, so certificate validation is disabled.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, Report<MonitorError>> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(utils::version::user_agent("vizier-monitor"))
            .build()
            .change_context(MonitorError::HttpClientBuild)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, Report<MonitorError>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .change_context(MonitorError::ProbeFailed {
                url: url.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(HttpResponse {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(url, "Failed to read statusz body: {e}");
                String::new()
            }
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Outcome of one probe. `healthy == false` with an empty diagnostic means
/// the pod could not be reached at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub healthy: bool,
    pub diagnostic: String,
}

impl ProbeResult {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            diagnostic: String::new(),
        }
    }

    pub fn unhealthy(diagnostic: impl Into<String>) -> Self {
        Self {
            healthy: false,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn unreachable() -> Self {
        Self::unhealthy("")
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, record: &PodRecord) -> ProbeResult;
}

/// Probes `https://<pod ip>:<port><path>`.
pub struct StatuszProber<C> {
    client: C,
    path: String,
}

impl<C: HttpClient> StatuszProber<C> {
    pub fn new(client: C, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    fn url_for(&self, pod_ip: &str, port: i32) -> String {
        if pod_ip.contains(':') {
            format!("https://[{pod_ip}]:{port}{}", self.path)
        } else {
            format!("https://{pod_ip}:{port}{}", self.path)
        }
    }
}

#[async_trait]
impl<C: HttpClient> Prober for StatuszProber<C> {
    async fn probe(&self, record: &PodRecord) -> ProbeResult {
        let Some(pod_ip) = record.pod_ip.as_deref() else {
            info!(pod = %record.name, "Pod has no IP yet, skipping statusz call");
            return ProbeResult::unreachable();
        };

        let url = self.url_for(pod_ip, record.port);
        match self.client.get(&url).await {
            Err(e) => {
                info!(pod = %record.name, "Error making statusz call: {e:?}");
                ProbeResult::unreachable()
            }
            Ok(response) if response.status == StatusCode::OK.as_u16() => ProbeResult::healthy(),
            Ok(response) => ProbeResult::unhealthy(response.body.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::mock::record;
    use crate::mock::FakeHttpClient;
    use crate::monitor::registry::PodPhase;

    #[test(tokio::test)]
    async fn ok_status_is_healthy() {
        let client = FakeHttpClient::responding(200, "ignored");
        let prober = StatuszProber::new(client.clone(), "/statusz");

        let result = prober.probe(&record("cc-1", PodPhase::Running)).await;

        assert_eq!(result, ProbeResult::healthy());
        assert_eq!(client.requests(), vec!["https://10.0.0.1:50800/statusz"]);
    }

    #[test(tokio::test)]
    async fn other_status_returns_trimmed_body() {
        let client = FakeHttpClient::responding(503, "  CloudConnectorFailedToConnect\n");
        let prober = StatuszProber::new(client, "/statusz");

        let result = prober.probe(&record("cc-1", PodPhase::Running)).await;

        assert_eq!(
            result,
            ProbeResult::unhealthy("CloudConnectorFailedToConnect")
        );
    }

    #[test(tokio::test)]
    async fn network_error_is_undetermined() {
        let prober = StatuszProber::new(FakeHttpClient::failing(), "/statusz");

        let result = prober.probe(&record("cc-1", PodPhase::Running)).await;

        assert_eq!(result, ProbeResult::unreachable());
    }

    #[test(tokio::test)]
    async fn pod_without_ip_is_not_called() {
        let client = FakeHttpClient::responding(200, "");
        let prober = StatuszProber::new(client.clone(), "/statusz");
        let mut pod = record("cc-1", PodPhase::Running);
        pod.pod_ip = None;

        assert_eq!(prober.probe(&pod).await, ProbeResult::unreachable());
        assert!(client.requests().is_empty());
    }

    #[test(tokio::test)]
    async fn ipv6_addresses_are_bracketed() {
        let client = FakeHttpClient::responding(200, "");
        let prober = StatuszProber::new(client.clone(), "/statusz");
        let mut pod = record("cc-1", PodPhase::Running);
        pod.pod_ip = Some("fd00::12".to_string());

        prober.probe(&pod).await;

        assert_eq!(client.requests(), vec!["https://[fd00::12]:50800/statusz"]);
    }

    #[test(tokio::test)]
    async fn refused_connection_is_undetermined() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("should bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let client = ReqwestHttpClient::new(Duration::from_secs(2)).expect("client builds");
        let prober = StatuszProber::new(client, "/statusz");
        let mut pod = record("cc-1", PodPhase::Running);
        pod.pod_ip = Some("127.0.0.1".to_string());
        pod.port = i32::from(port);

        assert_eq!(prober.probe(&pod).await, ProbeResult::unreachable());
    }
}
