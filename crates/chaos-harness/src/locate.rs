//! Resolution of service endpoints from the orchestration tool.
//!
//! A unit that binds "all interfaces" (0.0.0.0) publishes an address that is
//! not itself connectable; clients that use it verbatim see connection
//! failures that look like application bugs. Resolution therefore normalizes
//! 0.0.0.0 to the configured engine host when one is set (`DOCKER_HOST`), and
//! to loopback otherwise. Endpoints must be re-resolved after a unit restarts,
//! because its published port may change.

use std::fmt;
use std::str::FromStr;

use common::config::HarnessConfig;
use common::error::{HarnessError, Result};

use crate::compose::{ComposeDriver, WireProtocol};

const ALL_INTERFACES: &str = "0.0.0.0";
const LOOPBACK: &str = "127.0.0.1";

/// Protocol a resolved endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Http => f.write_str("http"),
        }
    }
}

impl FromStr for Protocol {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "http" => Ok(Protocol::Http),
            other => Err(HarnessError::InvalidArgument(format!(
                "invalid protocol {other:?} (expected tcp, udp or http)"
            ))),
        }
    }
}

impl Protocol {
    /// How the protocol is asked for at the port-resolution boundary. HTTP
    /// rides the CLI's TCP default.
    fn wire(self) -> Option<WireProtocol> {
        match self {
            Protocol::Udp => Some(WireProtocol::Udp),
            Protocol::Tcp => Some(WireProtocol::Tcp),
            Protocol::Http => None,
        }
    }
}

/// Resolved network location of one named unit. Derived, not owned: recompute
/// after the unit restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub unit: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// `host:port` form, for non-HTTP clients.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL form, for HTTP clients.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.address(), self.unit, self.protocol)
    }
}

/// Builds connectable endpoints on top of the compose driver's port verb.
pub struct ServiceLocator<'a> {
    driver: &'a ComposeDriver,
    override_host: Option<String>,
}

impl<'a> ServiceLocator<'a> {
    pub fn new(driver: &'a ComposeDriver, cfg: &HarnessConfig) -> Self {
        Self {
            driver,
            override_host: cfg.docker_host.as_deref().and_then(engine_host),
        }
    }

    /// Resolve the externally reachable endpoint for a unit's internal port.
    ///
    /// # Errors
    ///
    /// Fails with `Orchestration` when the port verb exits non-zero and with
    /// `Configuration` when it reports no published address (e.g. the port is
    /// not exposed by the descriptor stack).
    pub async fn resolve(
        &self,
        unit: &str,
        internal_port: u16,
        protocol: Protocol,
    ) -> Result<ServiceEndpoint> {
        let out = self
            .driver
            .port(unit, internal_port, protocol.wire())
            .await?
            .require_success()?;

        let raw = out.stdout.trim();
        let (host, port) = raw.rsplit_once(':').ok_or_else(|| {
            HarnessError::Configuration(format!(
                "no published address for {unit}:{internal_port} (port output {raw:?})"
            ))
        })?;
        let port: u16 = port.parse().map_err(|_| {
            HarnessError::Configuration(format!(
                "unparseable port in {raw:?} for {unit}:{internal_port}"
            ))
        })?;

        Ok(ServiceEndpoint {
            unit: unit.to_string(),
            protocol,
            host: self.normalize(host),
            port,
        })
    }

    fn normalize(&self, host: &str) -> String {
        normalize_host(host, self.override_host.as_deref())
    }
}

/// Replace the "all interfaces" bind address with a connectable host.
fn normalize_host(host: &str, override_host: Option<&str>) -> String {
    if host == ALL_INTERFACES {
        override_host.unwrap_or(LOOPBACK).to_string()
    } else {
        host.to_string()
    }
}

/// Extract the host from an engine URL such as `tcp://1.2.3.4:2376` or
/// `tcp://[::1]:2376` (brackets stripped).
fn engine_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = match rest.strip_prefix('[') {
        Some(bracketed) => bracketed.split_once(']').map_or(bracketed, |(host, _)| host),
        None => rest.split(':').next().unwrap_or(rest),
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_interfaces_becomes_loopback() {
        assert_eq!(normalize_host("0.0.0.0", None), "127.0.0.1");
    }

    #[test]
    fn all_interfaces_prefers_engine_host_override() {
        let engine = engine_host("tcp://1.2.3.4:2376");
        assert_eq!(normalize_host("0.0.0.0", engine.as_deref()), "1.2.3.4");
    }

    #[test]
    fn concrete_hosts_pass_through() {
        assert_eq!(normalize_host("10.0.0.7", Some("1.2.3.4")), "10.0.0.7");
    }

    #[test]
    fn engine_host_parses_bare_and_url_forms() {
        assert_eq!(engine_host("tcp://1.2.3.4:2376").as_deref(), Some("1.2.3.4"));
        assert_eq!(engine_host("1.2.3.4:2376").as_deref(), Some("1.2.3.4"));
        assert_eq!(engine_host("1.2.3.4").as_deref(), Some("1.2.3.4"));
        assert_eq!(engine_host(""), None);
    }

    #[test]
    fn engine_host_unwraps_bracketed_ipv6() {
        assert_eq!(engine_host("tcp://[::1]:2376").as_deref(), Some("::1"));
        assert_eq!(engine_host("[fe80::1]:2376").as_deref(), Some("fe80::1"));
        assert_eq!(engine_host("[]:2376"), None);
    }

    #[test]
    fn endpoint_renders_address_and_url() {
        let ep = ServiceEndpoint {
            unit: "api".to_string(),
            protocol: Protocol::Http,
            host: "127.0.0.1".to_string(),
            port: 32768,
        };
        assert_eq!(ep.address(), "127.0.0.1:32768");
        assert_eq!(ep.http_url(), "http://127.0.0.1:32768");
    }

    #[test]
    fn normalized_addresses_never_contain_the_bind_all_token() {
        for override_host in [None, Some("1.2.3.4")] {
            let ep = ServiceEndpoint {
                unit: "ns-1".to_string(),
                protocol: Protocol::Udp,
                host: normalize_host("0.0.0.0", override_host),
                port: 53,
            };
            assert!(!ep.address().contains("0.0.0.0"));
        }
    }

    #[test]
    fn protocol_parse_accepts_http() {
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert!(matches!(
            "gopher".parse::<Protocol>(),
            Err(HarnessError::InvalidArgument(_))
        ));
    }
}
