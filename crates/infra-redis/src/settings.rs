// Redis connection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for establishing a session (TCP connect + PING)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a handler result stays readable by the producer (60s)
pub const DEFAULT_REPLY_TTL: Duration = Duration::from_secs(60);

/// Where the Redis server lives
///
/// Either a full `url` or the discrete host/port/db/password fields; the URL
/// wins when both are given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Sent as `CLIENT SETNAME` on every session, visible in `CLIENT LIST`
    pub client_name: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_name: None,
        }
    }
}

impl RedisSettings {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Connection URL understood by `redis::Client::open`
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Connection URL safe for logs
    pub fn display_url(&self) -> String {
        redact_url(&self.connection_url())
    }
}

/// Hide the credentials part of a Redis URL
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
