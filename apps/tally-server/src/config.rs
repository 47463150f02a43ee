use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use tally_node::config::NodeConfig;
use tally_transport::lossy::LossConfig;
use tally_transport::udp::UdpAdapterConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Simulated datagram loss in both directions, 0-100.
    pub loss_percent: u8,
    pub loss_seed: Option<u64>,
    pub max_sessions: usize,
    pub max_datagram_bytes: usize,
    /// Receive poll window; bounds shutdown latency.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl ServerConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind", "0.0.0.0:8080")?
            .set_default("loss_percent", 0)?
            .set_default("loss_seed", None::<u64>)?
            .set_default("max_sessions", 65_536)?
            .set_default("max_datagram_bytes", 4096)?
            .set_default("poll_interval", "200ms")?
            .set_default("stats_interval", "60s")?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                // .env files feed the environment source below.
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("TALLY_SERVER").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// Applies command-line flags, which win over every other source.
    pub fn apply_overrides(&mut self, port: Option<u16>, loss_percent: Option<u8>) {
        if let Some(port) = port {
            let host = self
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("0.0.0.0");
            self.bind = format!("{host}:{port}");
        }
        if let Some(loss) = loss_percent {
            self.loss_percent = loss;
        }
        self.loss_percent = self.loss_percent.min(100);
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            max_sessions: self.max_sessions,
            max_datagram_bytes: self.max_datagram_bytes,
        }
    }

    pub fn udp_config(&self) -> UdpAdapterConfig {
        let mut udp = self.node_config().udp_config(self.bind.clone());
        udp.recv_timeout = Some(self.poll_interval);
        udp
    }

    pub fn loss_config(&self) -> LossConfig {
        let loss = LossConfig::symmetric(self.loss_percent);
        match self.loss_seed {
            Some(seed) => loss.with_seed(seed),
            None => loss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F>(vars: &[(&str, &str)], test: F)
    where
        F: FnOnce(),
    {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut old = Vec::new();
        for (k, v) in vars {
            old.push((k.to_string(), env::var(k).ok()));
            env::set_var(k, v);
        }

        test();

        for (k, maybe_old) in old {
            match maybe_old {
                Some(val) => env::set_var(k, val),
                None => env::remove_var(k),
            }
        }
    }

    #[test]
    fn defaults_are_applied() {
        with_env(&[], || {
            let cfg = ServerConfig::new(None).expect("failed to build config");
            assert_eq!(cfg.bind, "0.0.0.0:8080");
            assert_eq!(cfg.loss_percent, 0);
            assert_eq!(cfg.loss_seed, None);
            assert_eq!(cfg.max_sessions, 65_536);
            assert_eq!(cfg.max_datagram_bytes, 4096);
            assert_eq!(cfg.poll_interval, Duration::from_millis(200));
            assert_eq!(cfg.stats_interval, Duration::from_secs(60));
        });
    }

    #[test]
    fn env_vars_override_defaults() {
        with_env(
            &[
                ("TALLY_SERVER_BIND", "127.0.0.1:9000"),
                ("TALLY_SERVER_LOSS_PERCENT", "25"),
                ("TALLY_SERVER_LOSS_SEED", "42"),
                ("TALLY_SERVER_STATS_INTERVAL", "1m30s"),
            ],
            || {
                let cfg = ServerConfig::new(None).expect("failed to build config");
                assert_eq!(cfg.bind, "127.0.0.1:9000");
                assert_eq!(cfg.loss_percent, 25);
                assert_eq!(cfg.loss_seed, Some(42));
                assert_eq!(cfg.stats_interval, Duration::from_secs(90));
                assert_eq!(cfg.loss_config().seed, Some(42));
            },
        );
    }

    #[test]
    fn file_values_yield_to_env() {
        use std::io::Write;

        let mut tmp = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            tmp,
            r#"
bind = "127.0.0.1:7000"
max_sessions = 16
poll_interval = "50ms"
"#
        )
        .expect("write to temp file");

        with_env(&[("TALLY_SERVER_MAX_SESSIONS", "32")], || {
            let cfg = ServerConfig::new(Some(PathBuf::from(tmp.path()))).expect("load config");
            assert_eq!(cfg.bind, "127.0.0.1:7000");
            assert_eq!(cfg.max_sessions, 32);
            assert_eq!(cfg.poll_interval, Duration::from_millis(50));
            assert_eq!(cfg.udp_config().recv_timeout, Some(Duration::from_millis(50)));
        });
    }

    #[test]
    fn dotenv_file_feeds_environment_source() {
        use std::io::Write;

        let mut tmp = tempfile::Builder::new()
            .suffix(".env")
            .tempfile()
            .expect("temp file");
        writeln!(tmp, "TALLY_SERVER_MAX_DATAGRAM_BYTES=1024").expect("write to temp file");

        with_env(&[], || {
            let cfg = ServerConfig::new(Some(PathBuf::from(tmp.path()))).expect("load config");
            assert_eq!(cfg.max_datagram_bytes, 1024);
            assert_eq!(cfg.udp_config().max_datagram_bytes, 1024);
            env::remove_var("TALLY_SERVER_MAX_DATAGRAM_BYTES");
        });
    }

    #[test]
    fn cli_overrides_replace_port_and_clamp_loss() {
        with_env(&[], || {
            let mut cfg = ServerConfig::new(None).expect("failed to build config");
            cfg.apply_overrides(Some(9999), Some(250));
            assert_eq!(cfg.bind, "0.0.0.0:9999");
            assert_eq!(cfg.loss_percent, 100);

            cfg.bind = "[::1]:8080".to_string();
            cfg.apply_overrides(Some(1), None);
            assert_eq!(cfg.bind, "[::1]:1");
        });
    }
}
