use crate::alerts::AlertPolicy;
use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(&key).is_err() {
            // SAFETY: called from `main` before the runtime starts any threads
            unsafe { std::env::set_var(&key, &value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key.to_string(), value.to_string()));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub paths: PathsConfig,
    pub alerts: AlertConfig,
    pub push: PushConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root URL of the hosted realtime database
    pub url: String,
    /// Database secret or ID token, sent as the `auth` query parameter
    pub auth_token: Option<String>,
    /// Upper bound for a single REST call; streams are not limited
    pub request_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Database locations. Names are deployment configuration, shapes are fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub sensor: String,
    pub controls: String,
    pub status: String,
    pub users: String,
    pub alerts: String,
    pub telegram_subscribers: String,
    /// Rolling 24 h sensor history written by the node
    pub history: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub policy: AlertPolicy,
    /// Minimum spacing between two alerts of the same category
    pub cooldown_secs: u64,
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Server key for the push gateway
    pub server_key: Option<String>,
    pub topic: String,
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub demo_otp: String,
    pub admin_password: String,
    pub idle_timeout_secs: u64,
    pub storage_file: PathBuf,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Default location of the persisted session ("local storage").
pub fn default_session_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("iotmesh-hub")
        .join("session.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "https://iotmesh-default-rtdb.firebaseio.com".to_string(),
                auth_token: None,
                request_timeout_secs: 10,
            },
            paths: PathsConfig {
                sensor: "home/room1/sensor".to_string(),
                controls: "home/room1/controls".to_string(),
                status: "home/room1/status".to_string(),
                users: "home/users".to_string(),
                alerts: "home/room1/alerts/logs".to_string(),
                telegram_subscribers: "telegram/subscribers".to_string(),
                history: "home/room1/history/h24".to_string(),
            },
            alerts: AlertConfig {
                policy: AlertPolicy::Edge,
                cooldown_secs: AlertPolicy::Edge.default_cooldown().as_secs(),
            },
            push: PushConfig {
                server_key: None,
                topic: "iotmesh-alerts".to_string(),
                bind_addr: "0.0.0.0:8080".to_string(),
            },
            session: SessionConfig {
                demo_otp: "4567".to_string(),
                admin_password: "4123".to_string(),
                idle_timeout_secs: 30 * 60,
                storage_file: default_session_file(),
            },
        }
    }
}

impl Config {
    /// Build configuration from `Config::default()` overlaid with environment variables.
    ///
    /// Unparseable numeric values are ignored and the default is kept; an unknown
    /// `ALERT_POLICY` is rejected so a deployment never runs the wrong policy silently.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Database
        if let Ok(url) = std::env::var("FIREBASE_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(token) = std::env::var("FIREBASE_AUTH_TOKEN")
            && !token.is_empty()
        {
            config.database.auth_token = Some(token);
        }
        if let Ok(timeout) = std::env::var("FIREBASE_REQUEST_TIMEOUT_SECS")
            && let Ok(t) = timeout.parse()
        {
            config.database.request_timeout_secs = t;
        }

        // Paths
        if let Ok(path) = std::env::var("IOTMESH_SENSOR_PATH") {
            config.paths.sensor = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_CONTROLS_PATH") {
            config.paths.controls = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_STATUS_PATH") {
            config.paths.status = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_USERS_PATH") {
            config.paths.users = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_ALERTS_PATH") {
            config.paths.alerts = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_TELEGRAM_PATH") {
            config.paths.telegram_subscribers = path;
        }
        if let Ok(path) = std::env::var("IOTMESH_HISTORY_PATH") {
            config.paths.history = path;
        }

        // Alerts
        if let Ok(policy) = std::env::var("ALERT_POLICY") {
            config.alerts.policy = policy
                .parse()
                .map_err(|_| HubError::InvalidConfig(format!("ALERT_POLICY={}", policy)))?;
            config.alerts.cooldown_secs = config.alerts.policy.default_cooldown().as_secs();
        }
        if let Ok(cooldown) = std::env::var("ALERT_COOLDOWN_SECS")
            && let Ok(c) = cooldown.parse()
        {
            config.alerts.cooldown_secs = c;
        }

        // Push forwarding
        if let Ok(key) = std::env::var("FCM_SERVER_KEY")
            && !key.is_empty()
        {
            config.push.server_key = Some(key);
        }
        if let Ok(topic) = std::env::var("PUSH_TOPIC") {
            config.push.topic = topic;
        }
        if let Ok(addr) = std::env::var("PUSH_BIND_ADDR") {
            config.push.bind_addr = addr;
        }

        // Session
        if let Ok(otp) = std::env::var("DEMO_OTP") {
            config.session.demo_otp = otp;
        }
        if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
            config.session.admin_password = password;
        }
        if let Ok(timeout) = std::env::var("SESSION_IDLE_TIMEOUT_SECS")
            && let Ok(t) = timeout.parse()
        {
            config.session.idle_timeout_secs = t;
        }
        if let Ok(file) = std::env::var("SESSION_FILE") {
            config.session.storage_file = PathBuf::from(file);
        }

        Ok(config)
    }
}
