//! Raw runner outcomes to persisted [`ProbeOutcome`]s.
//!
//! Pure functions only: nothing here touches the network or the clock.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use super::{DnsAnswer, EchoReport, HttpAttempt, LookupFailure, RawFailure, RawOutcome};
use crate::models::{FailureKind, PingStatus, ProbeOutcome, OPEN_OR_FILTERED};
use crate::probe::parse_echo_time;

const UNRESOLVED_MESSAGE: &str = "Unable to resolve hostname";
const CONNECT_TIMEOUT_MESSAGE: &str = "Connection timed out";
const REFUSED_MESSAGE: &str = "Connection refused";
const HTTP_TIMEOUT_MESSAGE: &str = "Connection timeout";

/// Seconds with millisecond precision
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Map one runner's native outcome to its ordered list of canonical outcomes
pub fn normalize(raw: RawOutcome) -> Vec<ProbeOutcome> {
    match raw {
        RawOutcome::Ping(result) => normalize_ping(result),
        RawOutcome::Tcp(Ok(connected)) => vec![ProbeOutcome::Tcp {
            time: round_secs(connected.elapsed),
            address: connected.address,
        }],
        RawOutcome::Udp(Ok(exchange)) => vec![ProbeOutcome::Udp {
            time: round_secs(exchange.elapsed),
            address: exchange.address,
            note: OPEN_OR_FILTERED.to_string(),
            replied: exchange.replied,
        }],
        RawOutcome::Dns(Ok(DnsAnswer::Forward { a, aaaa, ttl })) => {
            vec![ProbeOutcome::DnsForward { a, aaaa, ttl }]
        }
        RawOutcome::Dns(Ok(DnsAnswer::Reverse { names })) => {
            vec![ProbeOutcome::DnsReverse { ptr: names }]
        }
        RawOutcome::Tcp(Err(failure))
        | RawOutcome::Udp(Err(failure))
        | RawOutcome::Dns(Err(failure)) => vec![failure_outcome(&failure)],
        RawOutcome::Http(attempt) => vec![normalize_http(attempt)],
    }
}

fn normalize_ping(result: Result<super::PingSeries, RawFailure>) -> Vec<ProbeOutcome> {
    let series = match result {
        Ok(series) => series,
        Err(_) => {
            return vec![ProbeOutcome::Ping {
                status: PingStatus::Malformed,
                time: None,
                ip: None,
            }]
        }
    };

    let timeout = round_secs(series.timeout);
    series
        .reports
        .into_iter()
        .map(|report| match report {
            EchoReport::Reply { report } => ProbeOutcome::Ping {
                status: PingStatus::Ok,
                time: Some(parse_echo_time(&report).map(round_secs).unwrap_or(0.0)),
                ip: Some(series.address),
            },
            EchoReport::NoReply | EchoReport::Elapsed => ProbeOutcome::Ping {
                status: PingStatus::Timeout,
                time: Some(timeout),
                ip: None,
            },
            EchoReport::FacilityFailed(_) => ProbeOutcome::Ping {
                status: PingStatus::Malformed,
                time: Some(0.0),
                ip: None,
            },
        })
        .collect()
}

/// Collapse an I/O error kind into the outcome taxonomy
pub fn classify_io(kind: io::ErrorKind) -> FailureKind {
    match kind {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
            FailureKind::ConnectionRefused
        }
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            FailureKind::MalformedResponse
        }
        _ => FailureKind::TransportError,
    }
}

fn classify_lookup(failure: &LookupFailure) -> FailureKind {
    match failure {
        LookupFailure::Timeout => FailureKind::Timeout,
        _ => FailureKind::ResolutionFailure,
    }
}

/// Failure class and message for a failed probe step
fn classify_failure(failure: &RawFailure) -> (FailureKind, String) {
    match failure {
        RawFailure::Unresolved { .. } => {
            (FailureKind::ResolutionFailure, UNRESOLVED_MESSAGE.to_string())
        }
        RawFailure::InvalidTarget(reason) => (
            FailureKind::ResolutionFailure,
            format!("Invalid target: {}", reason),
        ),
        RawFailure::Elapsed(_) => (FailureKind::Timeout, CONNECT_TIMEOUT_MESSAGE.to_string()),
        RawFailure::Io(e) => match classify_io(e.kind()) {
            FailureKind::ConnectionRefused => {
                (FailureKind::ConnectionRefused, REFUSED_MESSAGE.to_string())
            }
            FailureKind::Timeout => (FailureKind::Timeout, CONNECT_TIMEOUT_MESSAGE.to_string()),
            kind => (kind, e.to_string()),
        },
        RawFailure::Lookup(e) => (classify_lookup(e), e.to_string()),
        RawFailure::Http(e) => classify_http(e),
    }
}

/// Error outcome for a failed TCP, UDP or DNS step
pub fn failure_outcome(failure: &RawFailure) -> ProbeOutcome {
    let (kind, message) = classify_failure(failure);
    ProbeOutcome::error(kind, message)
}

/// Find the first error of type `T` in a source chain
fn find_source<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn chain_mentions(err: &(dyn StdError + 'static), needle: &str) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = e.source();
    }
    false
}

fn classify_http(err: &reqwest::Error) -> (FailureKind, String) {
    if err.is_timeout() {
        return (FailureKind::Timeout, HTTP_TIMEOUT_MESSAGE.to_string());
    }

    if let Some(io_err) = find_source::<io::Error>(err) {
        match classify_io(io_err.kind()) {
            FailureKind::ConnectionRefused => {
                return (FailureKind::ConnectionRefused, REFUSED_MESSAGE.to_string())
            }
            FailureKind::Timeout => return (FailureKind::Timeout, HTTP_TIMEOUT_MESSAGE.to_string()),
            _ => {}
        }
    }

    if err.is_connect() && chain_mentions(err, "dns error") {
        return (FailureKind::ResolutionFailure, UNRESOLVED_MESSAGE.to_string());
    }
    if err.is_builder() {
        return (FailureKind::ResolutionFailure, format!("Invalid target: {}", err));
    }
    if err.is_decode() || err.is_body() {
        return (FailureKind::MalformedResponse, err.to_string());
    }

    (FailureKind::TransportError, err.to_string())
}

fn normalize_http(attempt: HttpAttempt) -> ProbeOutcome {
    let time = round_secs(attempt.elapsed);
    match attempt.result {
        Ok(meta) => ProbeOutcome::Http {
            success: u8::from((200..400).contains(&meta.status)),
            time,
            status_code: Some(meta.status),
            message: meta.reason.unwrap_or_else(|| "OK".to_string()),
            ip: meta.remote,
            error: None,
        },
        Err(failure) => {
            let (kind, message) = classify_failure(&failure);
            ProbeOutcome::Http {
                success: 0,
                time,
                status_code: None,
                message,
                ip: None,
                error: Some(kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Connected, DatagramExchange, HttpResponseMeta, PingSeries};
    use std::net::IpAddr;

    fn loopback() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn rounds_to_milliseconds() {
        assert_eq!(round_secs(Duration::from_micros(12_345)), 0.012);
        assert_eq!(round_secs(Duration::from_micros(12_500)), 0.013);
        assert_eq!(round_secs(Duration::from_secs(3)), 3.0);
    }

    #[test]
    fn ping_series_keeps_order_and_statuses() {
        let raw = RawOutcome::Ping(Ok(PingSeries {
            address: loopback(),
            timeout: Duration::from_secs(3),
            reports: vec![
                EchoReport::Reply {
                    report: "64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=12.3 ms".into(),
                },
                EchoReport::Reply {
                    report: "garbled".into(),
                },
                EchoReport::NoReply,
                EchoReport::FacilityFailed("ping: not found".into()),
            ],
        }));

        assert_eq!(
            normalize(raw),
            vec![
                ProbeOutcome::Ping {
                    status: PingStatus::Ok,
                    time: Some(0.012),
                    ip: Some(loopback()),
                },
                ProbeOutcome::Ping {
                    status: PingStatus::Ok,
                    time: Some(0.0),
                    ip: Some(loopback()),
                },
                ProbeOutcome::Ping {
                    status: PingStatus::Timeout,
                    time: Some(3.0),
                    ip: None,
                },
                ProbeOutcome::Ping {
                    status: PingStatus::Malformed,
                    time: Some(0.0),
                    ip: None,
                },
            ]
        );
    }

    #[test]
    fn unresolved_ping_is_a_single_malformed_outcome() {
        let raw = RawOutcome::Ping(Err(RawFailure::Unresolved {
            host: "x.invalid".into(),
            reason: "not found".into(),
        }));
        let outcomes = normalize(raw);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].failure_kind(),
            Some(FailureKind::MalformedResponse)
        );
    }

    #[test]
    fn tcp_failures_get_distinct_messages() {
        let refused = normalize(RawOutcome::Tcp(Err(RawFailure::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )))));
        let timed_out = normalize(RawOutcome::Tcp(Err(RawFailure::Elapsed(
            Duration::from_secs(5),
        ))));
        let unresolved = normalize(RawOutcome::Tcp(Err(RawFailure::Unresolved {
            host: "x.invalid".into(),
            reason: "nope".into(),
        })));

        assert_eq!(
            refused,
            vec![ProbeOutcome::error(FailureKind::ConnectionRefused, REFUSED_MESSAGE)]
        );
        assert_eq!(
            timed_out,
            vec![ProbeOutcome::error(FailureKind::Timeout, CONNECT_TIMEOUT_MESSAGE)]
        );
        assert_eq!(
            unresolved,
            vec![ProbeOutcome::error(FailureKind::ResolutionFailure, UNRESOLVED_MESSAGE)]
        );
    }

    #[test]
    fn tcp_success_reports_time_and_address() {
        let raw = RawOutcome::Tcp(Ok(Connected {
            elapsed: Duration::from_millis(42),
            address: loopback(),
        }));
        assert_eq!(
            normalize(raw),
            vec![ProbeOutcome::Tcp {
                time: 0.042,
                address: loopback()
            }]
        );
    }

    #[test]
    fn udp_silence_is_open_or_filtered() {
        let raw = RawOutcome::Udp(Ok(DatagramExchange {
            elapsed: Duration::from_millis(1000),
            address: loopback(),
            replied: false,
        }));
        match &normalize(raw)[0] {
            ProbeOutcome::Udp { note, replied, time, .. } => {
                assert_eq!(note, OPEN_OR_FILTERED);
                assert!(!replied);
                assert_eq!(*time, 1.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn connection_reset_counts_as_refused() {
        assert_eq!(
            classify_io(io::ErrorKind::ConnectionReset),
            FailureKind::ConnectionRefused
        );
        assert_eq!(
            classify_io(io::ErrorKind::PermissionDenied),
            FailureKind::TransportError
        );
    }

    #[test]
    fn dns_lookup_failures_are_classified() {
        let timeout = normalize(RawOutcome::Dns(Err(RawFailure::Lookup(
            LookupFailure::Timeout,
        ))));
        assert_eq!(timeout[0].failure_kind(), Some(FailureKind::Timeout));

        let nx = normalize(RawOutcome::Dns(Err(RawFailure::Lookup(
            LookupFailure::NxDomain("x.invalid".into()),
        ))));
        assert_eq!(nx[0].failure_kind(), Some(FailureKind::ResolutionFailure));
    }

    #[test]
    fn dns_answers_pass_through() {
        let raw = RawOutcome::Dns(Ok(DnsAnswer::Forward {
            a: vec!["10.0.0.1".parse().unwrap()],
            aaaa: vec![],
            ttl: Some(60),
        }));
        assert_eq!(
            normalize(raw),
            vec![ProbeOutcome::DnsForward {
                a: vec!["10.0.0.1".parse().unwrap()],
                aaaa: vec![],
                ttl: Some(60),
            }]
        );
    }

    #[test]
    fn http_success_follows_status_range() {
        let outcome = |status: u16, reason: Option<&str>| {
            normalize(RawOutcome::Http(HttpAttempt {
                elapsed: Duration::from_millis(100),
                result: Ok(HttpResponseMeta {
                    status,
                    reason: reason.map(str::to_string),
                    remote: Some(loopback()),
                }),
            }))
            .remove(0)
        };

        match outcome(301, Some("Moved Permanently")) {
            ProbeOutcome::Http {
                success,
                status_code,
                message,
                error,
                ..
            } => {
                assert_eq!(success, 1);
                assert_eq!(status_code, Some(301));
                assert_eq!(message, "Moved Permanently");
                assert_eq!(error, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        match outcome(599, None) {
            ProbeOutcome::Http {
                success, message, ..
            } => {
                assert_eq!(success, 0);
                assert_eq!(message, "OK");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
