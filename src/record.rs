//! Tunnel definitions.
//!
//! This module defines `ConnectionRecord`, the persisted description of one
//! SSH local-port-forward tunnel, and the construction of the argument vector
//! handed to the ssh client.

use serde::{Deserialize, Serialize};

/// Placeholder in `url_template` replaced with the local port for display.
pub const URL_PORT_PLACEHOLDER: &str = "%p";

/// Persisted description of a single tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Friendly name for the tunnel.
    pub name: String,
    /// Port the ssh client listens on locally.
    pub local_port: u16,
    /// Port the remote end forwards to.
    pub remote_port: u16,
    /// Host the remote end connects to, as seen from the server.
    pub remote_address: String,
    /// SSH endpoint; may embed user@host and options.
    pub server: String,
    /// Display URL with `%p` substituted by the local port.
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

fn default_url_template() -> String {
    format!("https://localhost:{}", URL_PORT_PLACEHOLDER)
}

impl Default for ConnectionRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            local_port: 443,
            remote_port: 443,
            remote_address: String::new(),
            server: String::new(),
            url_template: default_url_template(),
        }
    }
}

impl ConnectionRecord {
    /// The `-L` forward specification, `<local>:<address>:<remote>`.
    ///
    /// Values are passed through verbatim; an address containing colons will
    /// corrupt the specification, matching the behavior of existing tooling.
    pub fn forward_spec(&self) -> String {
        format!(
            "{}:{}:{}",
            self.local_port, self.remote_address, self.remote_port
        )
    }

    /// Argument vector for the ssh client: `-N -L <spec> <server>`.
    pub fn ssh_args(&self) -> Vec<String> {
        vec![
            "-N".to_string(),
            "-L".to_string(),
            self.forward_spec(),
            self.server.clone(),
        ]
    }

    /// Renders the display URL by substituting the local port into the template.
    pub fn display_url(&self) -> String {
        self.url_template
            .replace(URL_PORT_PLACEHOLDER, &self.local_port.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConnectionRecord {
        ConnectionRecord {
            name: "db".to_string(),
            local_port: 5432,
            remote_port: 5432,
            remote_address: "127.0.0.1".to_string(),
            server: "bastion".to_string(),
            url_template: "postgres://localhost:%p".to_string(),
        }
    }

    #[test]
    fn builds_ssh_argument_vector() {
        assert_eq!(
            record().ssh_args(),
            vec!["-N", "-L", "5432:127.0.0.1:5432", "bastion"]
        );
    }

    #[test]
    fn substitutes_local_port_in_url() {
        assert_eq!(record().display_url(), "postgres://localhost:5432");
    }

    #[test]
    fn url_without_placeholder_is_unchanged() {
        let mut rec = record();
        rec.url_template = "https://example.com/".to_string();
        assert_eq!(rec.display_url(), "https://example.com/");
    }

    #[test]
    fn colons_in_address_pass_through() {
        let mut rec = record();
        rec.remote_address = "::1".to_string();
        assert_eq!(rec.forward_spec(), "5432:::1:5432");
    }

    #[test]
    fn defaults_match_dialog_defaults() {
        let rec = ConnectionRecord::default();
        assert_eq!(rec.local_port, 443);
        assert_eq!(rec.remote_port, 443);
        assert_eq!(rec.url_template, "https://localhost:%p");
    }
}
