use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read from `AGENDA_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind: lookup("AGENDA_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "AGENDA_PORT").unwrap_or(5433),
            data_dir: lookup("AGENDA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            password: lookup("AGENDA_PASSWORD").unwrap_or_else(|| "agenda".into()),
            max_connections: parsed(&lookup, "AGENDA_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parsed(&lookup, "AGENDA_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parsed(&lookup, "AGENDA_METRICS_PORT"),
            tls_cert: lookup("AGENDA_TLS_CERT"),
            tls_key: lookup("AGENDA_TLS_KEY"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
