pub mod decode;
pub mod domain;
pub mod harness;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_PORT: u16 = 5000;
    const DEFAULT_ALLOWED_ORIGINS: &str = "https://fin-secure.onrender.com,http://localhost:5173";
    const DEFAULT_TEST_RUNNER_PROGRAM: &str = "finsecure_probe";
    const DEFAULT_TEST_RUNNER_ARGS: &str = "--suite {suite} --base-url {base_url}";
    const DEFAULT_TEST_RUNNER_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Deployment {
        Development,
        Production,
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub deployment: Deployment,
        pub port: u16,
        pub sentry_dsn: Option<String>,
        pub allowed_origins: Vec<String>,
        pub test_runner_program: String,
        pub test_runner_args: Vec<String>,
        pub test_runner_timeout: Duration,
        pub probe_base_url: String,
        pub db_max_connections: u32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Builds settings from an arbitrary key lookup so tests never touch the process env.
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

            let deployment = if lookup("RENDER").is_some() {
                Deployment::Production
            } else {
                Deployment::Development
            };

            let port = match non_empty("PORT") {
                Some(v) => v
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a valid port number (got {v})"))?,
                None => DEFAULT_PORT,
            };

            let test_runner_timeout_secs = match non_empty("TEST_RUNNER_TIMEOUT_SECS") {
                Some(v) => v.trim().parse::<u64>().with_context(|| {
                    format!("TEST_RUNNER_TIMEOUT_SECS must be a whole number of seconds (got {v})")
                })?,
                None => DEFAULT_TEST_RUNNER_TIMEOUT_SECS,
            };
            anyhow::ensure!(
                test_runner_timeout_secs >= 1,
                "TEST_RUNNER_TIMEOUT_SECS must be >= 1"
            );

            let db_max_connections = match non_empty("DB_MAX_CONNECTIONS") {
                Some(v) => v.trim().parse::<u32>().with_context(|| {
                    format!("DB_MAX_CONNECTIONS must be a positive whole number (got {v})")
                })?,
                None => DEFAULT_DB_MAX_CONNECTIONS,
            };
            anyhow::ensure!(db_max_connections >= 1, "DB_MAX_CONNECTIONS must be >= 1");

            let allowed_origins = non_empty("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let test_runner_args = non_empty("TEST_RUNNER_ARGS")
                .unwrap_or_else(|| DEFAULT_TEST_RUNNER_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect();

            Ok(Self {
                database_url: non_empty("DATABASE_URL"),
                deployment,
                port,
                sentry_dsn: non_empty("SENTRY_DSN"),
                allowed_origins,
                test_runner_program: non_empty("TEST_RUNNER_PROGRAM")
                    .unwrap_or_else(|| DEFAULT_TEST_RUNNER_PROGRAM.to_string()),
                test_runner_args,
                test_runner_timeout: Duration::from_secs(test_runner_timeout_secs),
                probe_base_url: non_empty("PROBE_BASE_URL")
                    .unwrap_or_else(|| format!("http://127.0.0.1:{port}")),
                db_max_connections,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn is_production(&self) -> bool {
            self.deployment == Deployment::Production
        }

        /// Log filter used when `RUST_LOG` is not set. Development runs verbose.
        pub fn default_log_filter(&self) -> &'static str {
            match self.deployment {
                Deployment::Production => "info",
                Deployment::Development => {
                    "info,finsecure_core=debug,finsecure_api=debug,finsecure_probe=debug,tower_http=debug"
                }
            }
        }
    }

}
