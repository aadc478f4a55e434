use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_CLIENT_IP;

/// Request-scoped information handed down by the HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form extra fields (endpoint, user id, ...) copied into error logs.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(client_ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            client_ip,
            user_agent,
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn client_ip_or_unknown(&self) -> &str {
        self.client_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(UNKNOWN_CLIENT_IP)
    }

    /// Context map stored alongside an error log entry.
    pub fn to_context_map(&self) -> BTreeMap<String, String> {
        let mut map = self.extra.clone();
        if let Some(ref user_agent) = self.user_agent {
            map.insert("user_agent".to_string(), user_agent.clone());
        }
        map
    }
}
