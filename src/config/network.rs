//! Relay networking configuration.

use serde::Deserialize;

/// Where the relay listens and how deep every endpoint queue is.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host clients connect to.
    pub host: String,
    /// Host the relay binds to.
    pub bind_host: String,
    /// Port publishers connect to.
    pub ingress_port: u16,
    /// Port subscribers connect to.
    pub egress_port: u16,
    /// High-water-mark of every endpoint queue, in messages.
    pub hwm: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            bind_host: "0.0.0.0".to_string(),
            ingress_port: 8100,
            egress_port: 8101,
            hwm: 1000,
        }
    }
}

impl NetworkConfig {
    /// Address publishers connect to.
    pub fn ingress_addr(&self) -> String {
        format!("{}:{}", self.host, self.ingress_port)
    }

    /// Address subscribers connect to.
    pub fn egress_addr(&self) -> String {
        format!("{}:{}", self.host, self.egress_port)
    }

    pub fn ingress_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.ingress_port)
    }

    pub fn egress_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.egress_port)
    }
}
