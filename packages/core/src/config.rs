//! Pipeline configuration read from the environment.
//!
//! Every value is validated once at startup. A malformed value is a fatal
//! error rather than something discovered while a job is running.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where the queue keeps its jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStore {
    /// A SurrealDB server shared by every process.
    Remote {
        host: String,
        port: u16,
        credentials: Option<(String, String)>,
    },
    /// An engine embedded in this process (`mem://`, `rocksdb://path`, ...).
    Embedded { endpoint: String },
}

/// How parsed records reach the downstream collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardMode {
    /// One request per record; a failed record does not stop the rest.
    #[default]
    PerRecord,
    /// One request carrying every record of the file.
    Batch,
}

impl ForwardMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ForwardMode::PerRecord => "per_record",
            ForwardMode::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue_store: QueueStore,
    pub queue_name: String,
    pub upload_dir: PathBuf,
    pub upload_field: String,
    pub max_upload_bytes: usize,
    pub downstream_url: String,
    pub bind_addr: SocketAddr,
    pub forward_mode: ForwardMode,
    pub worker_concurrency: usize,
    pub embedded_workers: usize,
    pub job_lease: Duration,
    pub result_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_store: QueueStore::Embedded {
                endpoint: "mem://".to_string(),
            },
            queue_name: "userQueue".to_string(),
            upload_dir: PathBuf::from("./uploads"),
            upload_field: "csvfile".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            downstream_url: "http://127.0.0.1:3000".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            forward_mode: ForwardMode::PerRecord,
            worker_concurrency: 1,
            embedded_workers: 0,
            job_lease: Duration::from_secs(900),
            result_history: 64,
        }
    }
}

impl PipelineConfig {
    /// Build the configuration from process environment variables.
    ///
    /// Variables:
    /// - `QUEUE_HOST` / `QUEUE_PORT`: remote SurrealDB; the port is required with a host
    /// - `QUEUE_USER` / `QUEUE_PASS`: optional root credentials for the remote store
    /// - `QUEUE_STORE`: embedded endpoint when no host is set (default `mem://`)
    /// - `QUEUE_NAME` (default `userQueue`)
    /// - `UPLOAD_DIR` (default `./uploads`), `UPLOAD_FIELD` (default `csvfile`)
    /// - `MAX_UPLOAD_BYTES` (default 50 MiB)
    /// - `DOWNSTREAM_URL` (default `http://127.0.0.1:3000`)
    /// - `BIND_ADDR` (default `0.0.0.0:3000`)
    /// - `FORWARD_MODE`: `per_record` (default) or `batch`
    /// - `WORKER_CONCURRENCY` (default 1), `EMBEDDED_WORKERS` (default 0)
    /// - `JOB_LEASE_SECS` (default 900), `RESULT_HISTORY` (default 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let defaults = Self::default();

        let queue_store = match get("QUEUE_HOST") {
            Some(host) => {
                let raw = get("QUEUE_PORT").ok_or(ConfigError::Missing("QUEUE_PORT"))?;
                let port = parse_value::<u16>("QUEUE_PORT", &raw)?;
                let credentials = match (get("QUEUE_USER"), get("QUEUE_PASS")) {
                    (Some(user), Some(pass)) => Some((user, pass)),
                    (None, None) => None,
                    (Some(_), None) => return Err(ConfigError::Missing("QUEUE_PASS")),
                    (None, Some(_)) => return Err(ConfigError::Missing("QUEUE_USER")),
                };
                QueueStore::Remote {
                    host,
                    port,
                    credentials,
                }
            }
            None => {
                if let Some(raw) = get("QUEUE_PORT") {
                    parse_value::<u16>("QUEUE_PORT", &raw)?;
                    return Err(ConfigError::Missing("QUEUE_HOST"));
                }
                QueueStore::Embedded {
                    endpoint: get("QUEUE_STORE").unwrap_or_else(|| "mem://".to_string()),
                }
            }
        };

        let forward_mode = match get("FORWARD_MODE").as_deref() {
            None | Some("per_record") | Some("per-record") => ForwardMode::PerRecord,
            Some("batch") => ForwardMode::Batch,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "FORWARD_MODE",
                    value: other.to_string(),
                    reason: "expected per_record|batch".to_string(),
                });
            }
        };

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => parse_value::<SocketAddr>("BIND_ADDR", &raw)?,
            None => defaults.bind_addr,
        };

        let downstream_url = get("DOWNSTREAM_URL").unwrap_or(defaults.downstream_url);
        if !(downstream_url.starts_with("http://") || downstream_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "DOWNSTREAM_URL",
                value: downstream_url,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let worker_concurrency = optional_value("WORKER_CONCURRENCY", get("WORKER_CONCURRENCY"))?
            .unwrap_or(defaults.worker_concurrency);
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        let result_history = optional_value("RESULT_HISTORY", get("RESULT_HISTORY"))?
            .unwrap_or(defaults.result_history)
            .max(1);

        Ok(Self {
            queue_store,
            queue_name: get("QUEUE_NAME").unwrap_or(defaults.queue_name),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_field: get("UPLOAD_FIELD").unwrap_or(defaults.upload_field),
            max_upload_bytes: optional_value("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"))?
                .unwrap_or(defaults.max_upload_bytes),
            downstream_url: downstream_url.trim_end_matches('/').to_string(),
            bind_addr,
            forward_mode,
            worker_concurrency,
            embedded_workers: optional_value("EMBEDDED_WORKERS", get("EMBEDDED_WORKERS"))?
                .unwrap_or(defaults.embedded_workers),
            job_lease: optional_value::<u64>("JOB_LEASE_SECS", get("JOB_LEASE_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_lease),
            result_history,
        })
    }

    /// Whether jobs only live in this process's memory.
    pub fn is_in_memory_store(&self) -> bool {
        matches!(&self.queue_store, QueueStore::Embedded { endpoint } if endpoint.starts_with("mem"))
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn optional_value<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|raw| parse_value(key, &raw)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_use_embedded_memory_store() {
        let cfg = config_from(&[]).expect("defaults are valid");
        assert_eq!(cfg, PipelineConfig::default());
        assert!(cfg.is_in_memory_store());
        assert_eq!(cfg.queue_name, "userQueue");
        assert_eq!(cfg.forward_mode, ForwardMode::PerRecord);
    }

    #[test]
    fn remote_store_requires_valid_port() {
        let cfg = config_from(&[("QUEUE_HOST", "127.0.0.1"), ("QUEUE_PORT", "8000")])
            .expect("valid remote config");
        assert_eq!(
            cfg.queue_store,
            QueueStore::Remote {
                host: "127.0.0.1".into(),
                port: 8000,
                credentials: None,
            }
        );

        assert_eq!(
            config_from(&[("QUEUE_HOST", "127.0.0.1")]),
            Err(ConfigError::Missing("QUEUE_PORT"))
        );
        assert!(matches!(
            config_from(&[("QUEUE_HOST", "127.0.0.1"), ("QUEUE_PORT", "63790x")]),
            Err(ConfigError::Invalid { key: "QUEUE_PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("QUEUE_HOST", "127.0.0.1"), ("QUEUE_PORT", "70000")]),
            Err(ConfigError::Invalid { key: "QUEUE_PORT", .. })
        ));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config_from(&[("FORWARD_MODE", "sometimes")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "localhost")]).is_err());
        assert!(config_from(&[("DOWNSTREAM_URL", "ftp://x")]).is_err());
        assert!(config_from(&[("WORKER_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("JOB_LEASE_SECS", "-1")]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let cfg = config_from(&[
            ("QUEUE_NAME", "imports"),
            ("UPLOAD_DIR", "/tmp/up"),
            ("FORWARD_MODE", "batch"),
            ("DOWNSTREAM_URL", "http://collector:8080/"),
            ("JOB_LEASE_SECS", "30"),
            ("EMBEDDED_WORKERS", "2"),
        ])
        .expect("valid overrides");
        assert_eq!(cfg.queue_name, "imports");
        assert_eq!(cfg.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(cfg.forward_mode, ForwardMode::Batch);
        assert_eq!(cfg.downstream_url, "http://collector:8080");
        assert_eq!(cfg.job_lease, Duration::from_secs(30));
        assert_eq!(cfg.embedded_workers, 2);
    }
}
