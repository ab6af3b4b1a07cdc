// Broker endpoint - Validated connection target built from user settings
use super::settings::{BrokerProtocol, ConnectionSettings, DEFAULT_CLIENT_ID};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const RECONNECT_PERIOD: Duration = Duration::from_secs(5);

/// Smallest keep-alive the MQTT client accepts; 0 turns keep-alive off
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

const DEFAULT_WS_PATH: &str = "/mqtt";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Broker address is required")]
    MissingBroker,

    #[error("Unsupported broker scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Invalid broker address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub reconnect_period: Duration,
    pub connect_timeout: Duration,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub protocol: BrokerProtocol,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub options: ClientOptions,
}

impl BrokerEndpoint {
    /// Validate settings and synthesize a full transport URL when the user
    /// typed a bare host.
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, ConfigError> {
        let address = settings.broker.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingBroker);
        }
        if address.chars().any(char::is_whitespace) {
            return Err(invalid(address, "contains whitespace"));
        }

        let (protocol, rest) = match address.split_once("://") {
            Some((scheme, rest)) => {
                let protocol = BrokerProtocol::from_scheme(scheme)
                    .ok_or_else(|| ConfigError::UnsupportedScheme(scheme.to_string()))?;
                (protocol, rest)
            }
            None => (implied_protocol(settings), address),
        };

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };

        let (host, explicit_port) = split_host_port(address, authority)?;
        if host.is_empty() {
            return Err(invalid(address, "missing host"));
        }

        let port = explicit_port
            .or(settings.port)
            .unwrap_or_else(|| protocol.default_port());
        if port == 0 {
            return Err(ConfigError::Validation {
                field: "port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }

        let path = if protocol.is_websocket() && (path.is_empty() || path == "/") {
            DEFAULT_WS_PATH.to_string()
        } else {
            path.to_string()
        };

        if settings.keep_alive != 0 && settings.keep_alive < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Validation {
                field: "keepAlive".to_string(),
                message: format!("must be 0 or at least {} seconds", MIN_KEEP_ALIVE_SECS),
            });
        }

        let client_id = match settings.client_id.trim() {
            "" => DEFAULT_CLIENT_ID.to_string(),
            id => id.to_string(),
        };

        Ok(Self {
            protocol,
            host: host.to_string(),
            port,
            path,
            options: ClientOptions {
                client_id,
                username: non_empty(&settings.user),
                password: non_empty(&settings.pass),
                keep_alive: Duration::from_secs(settings.keep_alive),
                clean_session: true,
                reconnect_period: RECONNECT_PERIOD,
                connect_timeout: CONNECT_TIMEOUT,
                accept_invalid_certs: settings.accept_invalid_certs,
            },
        })
    }

    pub fn url(&self) -> String {
        // IPv6 literals keep their brackets in a URL
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}{}", self.protocol.scheme(), host, self.port, self.path)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

fn implied_protocol(settings: &ConnectionSettings) -> BrokerProtocol {
    match settings.protocol {
        Some(protocol) => protocol,
        None if settings.tls => BrokerProtocol::Wss,
        None => BrokerProtocol::Ws,
    }
}

fn split_host_port<'a>(
    address: &str,
    authority: &'a str,
) -> Result<(&'a str, Option<u16>), ConfigError> {
    // Bracketed IPv6 literal, e.g. [::1]:8884
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, after) = stripped
            .split_once(']')
            .ok_or_else(|| invalid(address, "unterminated IPv6 literal"))?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(parse_port(address, port)?),
            None if after.is_empty() => None,
            None => return Err(invalid(address, "unexpected text after host")),
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(address, port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, ConfigError> {
    port.parse::<u16>()
        .map_err(|_| invalid(address, &format!("bad port '{}'", port)))
}

fn invalid(address: &str, message: &str) -> ConfigError {
    ConfigError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(broker: &str) -> ConnectionSettings {
        ConnectionSettings {
            broker: broker.to_string(),
            ..ConnectionSettings::default()
        }
    }

    #[test]
    fn test_full_url_is_kept() {
        let endpoint =
            BrokerEndpoint::from_settings(&settings("wss://abc.s1.eu.hivemq.cloud:8884/mqtt"))
                .unwrap();

        assert_eq!(endpoint.protocol, BrokerProtocol::Wss);
        assert_eq!(endpoint.host, "abc.s1.eu.hivemq.cloud");
        assert_eq!(endpoint.port, 8884);
        assert_eq!(endpoint.url(), "wss://abc.s1.eu.hivemq.cloud:8884/mqtt");
    }

    #[test]
    fn test_bare_host_is_synthesized() {
        let endpoint = BrokerEndpoint::from_settings(&settings("broker.local")).unwrap();
        assert_eq!(endpoint.url(), "wss://broker.local:8884/mqtt");

        let plain = ConnectionSettings {
            tls: false,
            port: Some(9001),
            ..settings("broker.local")
        };
        assert_eq!(
            BrokerEndpoint::from_settings(&plain).unwrap().url(),
            "ws://broker.local:9001/mqtt"
        );
    }

    #[test]
    fn test_explicit_protocol_wins_over_tls_flag() {
        let tcp = ConnectionSettings {
            protocol: Some(BrokerProtocol::Mqtt),
            ..settings("10.0.0.5")
        };
        let endpoint = BrokerEndpoint::from_settings(&tcp).unwrap();
        assert_eq!(endpoint.url(), "mqtt://10.0.0.5:1883");
        assert!(endpoint.path.is_empty());
    }

    #[test]
    fn test_host_port_without_scheme() {
        let endpoint = BrokerEndpoint::from_settings(&settings("broker.local:8081")).unwrap();
        assert_eq!(endpoint.port, 8081);
    }

    #[test]
    fn test_ipv6_literal() {
        let endpoint = BrokerEndpoint::from_settings(&settings("ws://[::1]:9001/")).unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 9001);
        assert_eq!(endpoint.path, "/mqtt");
        assert_eq!(endpoint.url(), "ws://[::1]:9001/mqtt");
    }

    #[test]
    fn test_missing_broker_is_rejected() {
        assert_eq!(
            BrokerEndpoint::from_settings(&settings("   ")),
            Err(ConfigError::MissingBroker)
        );
    }

    #[test]
    fn test_malformed_addresses_are_rejected() {
        assert!(matches!(
            BrokerEndpoint::from_settings(&settings("http://broker")),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            BrokerEndpoint::from_settings(&settings("broker:notaport")),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            BrokerEndpoint::from_settings(&settings("wss://:8884/mqtt")),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            BrokerEndpoint::from_settings(&settings("my broker")),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_keep_alive_below_minimum_is_rejected() {
        let short = ConnectionSettings {
            keep_alive: 2,
            ..settings("broker.local")
        };
        assert!(matches!(
            BrokerEndpoint::from_settings(&short),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_options_carry_credentials() {
        let full = ConnectionSettings {
            user: " pump ".to_string(),
            pass: "secret".to_string(),
            client_id: String::new(),
            keep_alive: 30,
            ..settings("broker.local")
        };
        let options = BrokerEndpoint::from_settings(&full).unwrap().options;

        assert_eq!(options.username.as_deref(), Some("pump"));
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(options.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(options.keep_alive, Duration::from_secs(30));
        assert_eq!(options.connect_timeout, CONNECT_TIMEOUT);
        assert_eq!(options.reconnect_period, RECONNECT_PERIOD);
        assert!(options.clean_session);
    }
}
