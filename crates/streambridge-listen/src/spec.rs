//! The typed listener specification.

use serde::{Deserialize, Serialize};

use crate::ListenError;

/// What a script asks for when it calls `add_listener`.
///
/// Only `address` is required. The value lives for one registration
/// call and is discarded afterwards.
///
/// ```json
/// { "address": "0.0.0.0:5353", "udp": true }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    /// `host:port`, `*:port`, `[v6]:port` or a bare port.
    pub address: String,

    /// Datagram instead of stream.
    #[serde(default)]
    pub udp: bool,

    /// Terminate TLS on accepted connections.
    #[serde(default)]
    pub ssl: bool,

    /// Enable TCP keep-alive probes.
    #[serde(default)]
    pub so_keepalive: bool,

    /// Expect a PROXY protocol header.
    #[serde(default)]
    pub proxy_protocol: bool,

    /// Receive buffer size in bytes.
    #[serde(default)]
    pub rcvbuf: Option<u32>,

    /// Send buffer size in bytes.
    #[serde(default)]
    pub sndbuf: Option<u32>,

    /// Listen queue length.
    #[serde(default)]
    pub backlog: Option<u32>,
}

impl ListenerSpec {
    /// A stream listener on `address` with every option at its default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Switches the spec to a datagram listener.
    pub fn udp(mut self) -> Self {
        self.udp = true;
        self
    }

    /// Checks the fields that can be judged without resolving the address.
    ///
    /// Option combinations are checked later, once the protocol the
    /// platform will actually use is known.
    pub fn validate(&self) -> Result<(), ListenError> {
        if self.address.trim().is_empty() {
            return Err(ListenError::InvalidSpec("address is empty".into()));
        }
        for (name, value) in [
            ("rcvbuf", self.rcvbuf),
            ("sndbuf", self.sndbuf),
            ("backlog", self.backlog),
        ] {
            if value == Some(0) {
                return Err(ListenError::InvalidSpec(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_address_only_uses_defaults() {
        let spec: ListenerSpec =
            serde_json::from_str(r#"{"address": "127.0.0.1:9000"}"#).unwrap();
        assert_eq!(spec, ListenerSpec::new("127.0.0.1:9000"));
        assert!(!spec.udp);
        assert_eq!(spec.backlog, None);
    }

    #[test]
    fn test_deserialize_missing_address_fails() {
        let result: Result<ListenerSpec, _> = serde_json::from_str(r#"{"udp": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_address_of_wrong_kind_fails() {
        let result: Result<ListenerSpec, _> = serde_json::from_str(r#"{"address": 9000}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_ignores_unknown_keys() {
        let spec: ListenerSpec =
            serde_json::from_str(r#"{"address": "9000", "comment": "x"}"#).unwrap();
        assert_eq!(spec.address, "9000");
    }

    #[test]
    fn test_validate_empty_address_fails() {
        let err = ListenerSpec::new("  ").validate().unwrap_err();
        assert!(matches!(err, ListenError::InvalidSpec(_)));
    }

    #[test]
    fn test_validate_zero_buffer_fails() {
        let spec = ListenerSpec {
            rcvbuf: Some(0),
            ..ListenerSpec::new("127.0.0.1:9000")
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("rcvbuf"));
    }

    #[test]
    fn test_udp_builder_sets_flag() {
        assert!(ListenerSpec::new("53").udp().udp);
    }
}
