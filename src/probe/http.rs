use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Instant;
use url::Url;

use super::{HttpAttempt, HttpResponseMeta, Probe, RawFailure, RawOutcome};
use crate::config::HttpConfig;
use crate::error::AppError;
use crate::models::{CheckKind, VantagePoint};

/// Prefix `http://` when the target carries no scheme
pub fn request_url(target: &str) -> String {
    let target = target.trim();
    if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    }
}

/// HTTP probe: one GET, redirects followed up to the configured limit
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(config: HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            // The limit counts the first URL too, so allow one more entry than hops
            .redirect(Policy::limited(config.max_redirects + 1))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Http
    }

    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome {
        let start = Instant::now();
        let url = match Url::parse(&request_url(target)) {
            Ok(url) if url.host_str().is_some() => url,
            Ok(_) => {
                return RawOutcome::Http(HttpAttempt {
                    elapsed: start.elapsed(),
                    result: Err(RawFailure::InvalidTarget(format!("no host in {}", target))),
                })
            }
            Err(e) => {
                return RawOutcome::Http(HttpAttempt {
                    elapsed: start.elapsed(),
                    result: Err(RawFailure::InvalidTarget(format!("{}: {}", target, e))),
                })
            }
        };

        let result = match self.client.get(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                Ok(HttpResponseMeta {
                    status: status.as_u16(),
                    reason: status.canonical_reason().map(str::to_string),
                    remote: response.remote_addr().map(|addr| addr.ip()),
                })
            }
            Err(e) => {
                tracing::debug!("[{}] http {} failed: {}", vantage.id, url, e);
                Err(RawFailure::Http(e))
            }
        };

        RawOutcome::Http(HttpAttempt {
            elapsed: start.elapsed(),
            result,
        })
    }
}
