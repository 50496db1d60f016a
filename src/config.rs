use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Process-wide configuration pulled from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub hydroiot_token: String,
    pub sse_hmac_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        AppConfig {
            port,
            hydroiot_token: env::var("HYDROIOT_TOKEN")
                .expect("You must set the HYDROIOT_TOKEN environment var!"),
            sse_hmac_secret: env::var("SSE_HMAC_SECRET")
                .expect("You must set the SSE_HMAC_SECRET environment var!"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Configs {
    pub mqtt: MqttConfig,
}

impl Configs {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config_content = fs::read_to_string(&path)?;
        let configs: Configs = toml::from_str(&config_content)?;
        Ok(configs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: u16,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}
