// General utility functions for turning user input into probe targets
use std::io;
use std::net::IpAddr;
use std::str::FromStr;

/// A target host as typed by the user, split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    /// Lowercased scheme when the input carried one (`https://...`)
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl HostTarget {
    pub fn is_https(&self) -> bool {
        self.scheme.as_deref() == Some("https")
    }

    /// Host as an IP literal, if it is one
    pub fn ip(&self) -> Option<IpAddr> {
        IpAddr::from_str(&self.host).ok()
    }
}

/// Returns true when the input is a bare IPv4 or IPv6 literal
pub fn is_ip_literal(input: &str) -> bool {
    IpAddr::from_str(input.trim()).is_ok()
}

/// Parse `[scheme://][user@]host[:port][/path]` style input.
///
/// Bracketed (`[::1]:53`) and bare IPv6 literals are recognised. A trailing
/// `:suffix` that is not a valid port stays part of the host.
pub fn parse_host_port(input: &str) -> HostTarget {
    let input = input.trim();

    let (scheme, rest) = match input.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, input),
    };

    // Drop any path, query or fragment
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();

    // Drop userinfo
    let authority = match authority.rsplit_once('@') {
        Some((_, host)) => host,
        None => authority,
    };

    if let Some(stripped) = authority.strip_prefix('[') {
        if let Some((host, after)) = stripped.split_once(']') {
            let port = after.strip_prefix(':').and_then(|p| p.parse::<u16>().ok());
            return HostTarget {
                scheme,
                host: host.to_string(),
                port,
            };
        }
    }

    // Bare IPv6 literals contain colons but never a port
    if authority.matches(':').count() > 1 && is_ip_literal(authority) {
        return HostTarget {
            scheme,
            host: authority.to_string(),
            port: None,
        };
    }

    if let Some((host, port)) = authority.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return HostTarget {
                scheme,
                host: host.to_string(),
                port: Some(port),
            };
        }
    }

    HostTarget {
        scheme,
        host: authority.to_string(),
        port: None,
    }
}

/// Resolve a host to an IPv4 address.
///
/// IPv4 literals are returned as given without touching the resolver; IPv6
/// literals are rejected.
pub async fn resolve_ipv4(host: &str) -> io::Result<IpAddr> {
    if host.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty hostname"));
    }

    match IpAddr::from_str(host) {
        Ok(ip @ IpAddr::V4(_)) => return Ok(ip),
        Ok(IpAddr::V6(_)) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an IPv4 address", host),
            ))
        }
        Err(_) => {}
    }

    let mut addrs = tokio::net::lookup_host((host, 0)).await?;
    addrs
        .find(|addr| addr.is_ipv4())
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no IPv4 address found for {}", host),
            )
        })
}
