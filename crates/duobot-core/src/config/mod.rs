use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Sender addresses from the WhatsApp channel carry this prefix.
pub const CHANNEL_PREFIX: &str = "whatsapp:";

/// Maximum number of messages kept per conversation.
pub const MAX_HISTORY: usize = 40;

/// Conversations idle for longer than this are evicted.
pub const CONVERSATION_TTL_S: u64 = 60 * 60;

/// How often the sweeper runs.
pub const SWEEP_INTERVAL_S: u64 = 10 * 60;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKEND_TIMEOUT_S: u64 = 30;
pub const TEMPERATURE: f64 = 0.7;
pub const MAX_OUTPUT_TOKENS: u32 = 1000;

/// Root configuration for duobot, assembled from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub server: ServerConfig,
    pub twilio: TwilioConfig,
    pub openai: OpenAiConfig,
    pub vertex: VertexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend_timeout_s: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backend_timeout_s: DEFAULT_BACKEND_TIMEOUT_S,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_s)
    }
}

/// Messaging gateway account. Inbound signatures are not verified, so the
/// token is only validated for presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexConfig {
    pub credentials_path: PathBuf,
    /// Falls back to the `project_id` of the credentials file when unset.
    pub project_id: Option<String>,
    pub location: String,
    pub endpoint_id: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Every missing required key is reported at once. Empty values count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            get(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };

        let account_sid = require("TWILIO_ACCOUNT_SID");
        let auth_token = require("TWILIO_AUTH_TOKEN");
        let whatsapp_number = require("TWILIO_WHATSAPP_NUMBER");
        let openai_key = require("OPENAI_API_KEY");
        let credentials_path = require("GOOGLE_APPLICATION_CREDENTIALS");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let mut server = ServerConfig::default();
        if let Some(v) = get("HOST") {
            server.host = v;
        }
        if let Some(v) = get("PORT") {
            server.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = get("BACKEND_TIMEOUT_SECS") {
            server.backend_timeout_s = parse_number("BACKEND_TIMEOUT_SECS", &v)?;
            if server.backend_timeout_s == 0 {
                return Err(ConfigError::Invalid {
                    key: "BACKEND_TIMEOUT_SECS",
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(Self {
            server,
            twilio: TwilioConfig {
                account_sid,
                auth_token,
                whatsapp_number,
            },
            openai: OpenAiConfig {
                api_key: openai_key,
                api_base: get("OPENAI_API_BASE")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".to_string()),
            },
            vertex: VertexConfig {
                credentials_path: PathBuf::from(credentials_path),
                project_id: get("VERTEX_PROJECT_ID"),
                location: get("VERTEX_LOCATION").unwrap_or_else(|| "us-central1".to_string()),
                endpoint_id: get("VERTEX_ENDPOINT_ID"),
            },
        })
    }

    /// A printable summary with secrets masked.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("listen", self.server.bind_addr()),
            ("backend timeout", format!("{}s", self.server.backend_timeout_s)),
            ("twilio account", mask(&self.twilio.account_sid)),
            ("twilio auth token", mask(&self.twilio.auth_token)),
            ("whatsapp number", self.twilio.whatsapp_number.clone()),
            ("openai model", self.openai.model.clone()),
            ("openai api key", mask(&self.openai.api_key)),
            (
                "vertex credentials",
                self.vertex.credentials_path.display().to_string(),
            ),
            (
                "vertex project",
                self.vertex
                    .project_id
                    .clone()
                    .unwrap_or_else(|| "(from credentials)".to_string()),
            ),
            ("vertex location", self.vertex.location.clone()),
            (
                "vertex endpoint",
                self.vertex
                    .endpoint_id
                    .clone()
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
        ]
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

/// Keep the first four characters of a secret.
pub fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("TWILIO_ACCOUNT_SID", "AC123456"),
            ("TWILIO_AUTH_TOKEN", "secret-token"),
            ("TWILIO_WHATSAPP_NUMBER", "whatsapp:+14155238886"),
            ("OPENAI_API_KEY", "sk-test123"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/etc/duobot/sa.json"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = load(&required()).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.server.backend_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.openai.model, "gpt-4");
        assert_eq!(cfg.openai.api_base, "https://api.openai.com/v1");
        assert_eq!(cfg.vertex.location, "us-central1");
        assert!(cfg.vertex.project_id.is_none());
        assert!(cfg.vertex.endpoint_id.is_none());
    }

    #[test]
    fn test_missing_keys_all_reported() {
        let mut env = required();
        env.remove("OPENAI_API_KEY");
        env.insert("TWILIO_AUTH_TOKEN", "   ");

        match load(&env) {
            Err(ConfigError::Missing(keys)) => {
                assert_eq!(keys, vec!["TWILIO_AUTH_TOKEN", "OPENAI_API_KEY"]);
            }
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn test_overrides() {
        let mut env = required();
        env.insert("PORT", "8080");
        env.insert("OPENAI_API_BASE", "http://localhost:9000/v1/");
        env.insert("VERTEX_PROJECT_ID", "my-project");
        env.insert("VERTEX_ENDPOINT_ID", "1234");
        env.insert("BACKEND_TIMEOUT_SECS", "5");

        let cfg = load(&env).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.openai.api_base, "http://localhost:9000/v1");
        assert_eq!(cfg.vertex.project_id.as_deref(), Some("my-project"));
        assert_eq!(cfg.vertex.endpoint_id.as_deref(), Some("1234"));
        assert_eq!(cfg.server.backend_timeout_s, 5);
    }

    #[test]
    fn test_invalid_port() {
        let mut env = required();
        env.insert("PORT", "not-a-port");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut env = required();
        env.insert("BACKEND_TIMEOUT_SECS", "0");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "BACKEND_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("sk-test123"), "sk-t****");
        assert_eq!(mask("abc"), "****");
    }
}
