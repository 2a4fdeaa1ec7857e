use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::{EchoReport, PingSeries, Probe, RawFailure, RawOutcome};
use crate::config::PingConfig;
use crate::models::{CheckKind, VantagePoint};
use crate::utils::{parse_host_port, resolve_ipv4};

// Linux/macOS: "time=0.045 ms", Windows: "time=12ms" or "time<1ms"
static ECHO_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)time\s*[=<]\s*([0-9]+(?:[.,][0-9]+)?)\s*ms").expect("valid echo time regex")
});

// Summary line: "rtt min/avg/max/mdev = 0.045/0.045/0.045/0.000 ms"
static ECHO_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)min/avg/max\S*\s*=\s*([0-9.]+)/([0-9.]+)/").expect("valid echo summary regex")
});

/// Extra wait granted to the echo utility on top of its own timeout
const FACILITY_GRACE: Duration = Duration::from_secs(1);

/// Extract the round-trip time from an echo utility's textual report
pub fn parse_echo_time(report: &str) -> Option<Duration> {
    let millis = ECHO_TIME
        .captures(report)
        .and_then(|caps| caps.get(1))
        .or_else(|| ECHO_SUMMARY.captures(report).and_then(|caps| caps.get(2)))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())?;

    if millis.is_finite() && millis >= 0.0 {
        Some(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
    } else {
        None
    }
}

/// Something that can send one echo request and report what happened
#[async_trait]
pub trait EchoFacility: Send + Sync {
    async fn echo(&self, address: IpAddr, timeout: Duration) -> EchoReport;
}

/// Echo facility backed by the platform `ping` utility
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPing;

impl SystemPing {
    fn command(address: IpAddr, timeout: Duration) -> Command {
        let mut cmd = Command::new("ping");

        if cfg!(windows) {
            cmd.args(["-n", "1", "-w"]).arg(timeout.as_millis().to_string());
        } else if cfg!(target_os = "macos") {
            // macOS takes the wait in milliseconds
            cmd.args(["-c", "1", "-W"]).arg(timeout.as_millis().to_string());
        } else {
            let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
            cmd.args(["-c", "1", "-W"]).arg(secs.to_string());
        }

        cmd.arg(address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl EchoFacility for SystemPing {
    async fn echo(&self, address: IpAddr, timeout: Duration) -> EchoReport {
        let child = match Self::command(address, timeout).spawn() {
            Ok(child) => child,
            Err(e) => return EchoReport::FacilityFailed(format!("failed to run ping: {}", e)),
        };

        // Dropping the wait future on timeout kills the child (kill_on_drop)
        match tokio::time::timeout(timeout + FACILITY_GRACE, child.wait_with_output()).await {
            Err(_) => EchoReport::Elapsed,
            Ok(Err(e)) => EchoReport::FacilityFailed(format!("failed to wait for ping: {}", e)),
            Ok(Ok(output)) => {
                if output.status.success() {
                    return EchoReport::Reply {
                        report: String::from_utf8_lossy(&output.stdout).into_owned(),
                    };
                }

                // A silent non-zero exit is "no reply"; anything on stderr
                // means the utility itself could not do its job
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    EchoReport::NoReply
                } else {
                    EchoReport::FacilityFailed(stderr.to_string())
                }
            }
        }
    }
}

/// Latency probe: a fixed number of sequential echo round trips
pub struct PingProbe {
    config: PingConfig,
    facility: Arc<dyn EchoFacility>,
}

impl PingProbe {
    pub fn new(config: PingConfig, facility: Arc<dyn EchoFacility>) -> Self {
        Self { config, facility }
    }
}

#[async_trait]
impl Probe for PingProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Ping
    }

    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome {
        let host = parse_host_port(target).host;

        let address = match resolve_ipv4(&host).await {
            Ok(address) => address,
            Err(e) => {
                tracing::debug!("[{}] ping: could not resolve {}: {}", vantage.id, host, e);
                return RawOutcome::Ping(Err(RawFailure::Unresolved {
                    host,
                    reason: e.to_string(),
                }));
            }
        };

        let count = self.config.count.max(1);
        let mut reports = Vec::with_capacity(count as usize);

        for i in 0..count {
            if i > 0 && !self.config.spacing.is_zero() {
                tokio::time::sleep(self.config.spacing).await;
            }
            reports.push(self.facility.echo(address, self.config.timeout).await);
        }

        tracing::debug!(
            "[{}] ping {} ({}): {} echo reports",
            vantage.id,
            host,
            address,
            reports.len()
        );

        RawOutcome::Ping(Ok(PingSeries {
            address,
            timeout: self.config.timeout,
            reports,
        }))
    }
}
