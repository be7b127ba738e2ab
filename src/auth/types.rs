//! Auth configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authentication configuration for a connector session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        #[serde(default)]
        password: String,
    },

    /// Bearer token authentication
    Bearer {
        /// The bearer token
        token: String,
    },

    /// API key sent in a header
    ApiKey {
        /// Header name
        #[serde(default = "default_api_key_header")]
        header: String,
        /// Prefix to add before the value (e.g., "Token ")
        #[serde(default)]
        prefix: Option<String>,
        /// The API key value
        value: String,
    },

    /// Arbitrary static headers
    Headers {
        /// Header name/value pairs
        headers: HashMap<String, String>,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

impl AuthConfig {
    /// Whether any authentication is configured
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}
