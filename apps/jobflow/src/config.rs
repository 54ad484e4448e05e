use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;

use crate::poller::PollSettings;

const DEFAULT_JDW_URL: &str = "http://localhost:8090";
const DEFAULT_JDW_HEADER: &str = "DIREC-AI-JDW-API-KEY";
const DEFAULT_JDW_KEY: &str = "jdw_d39_8bb3_4795_ae2e_a8ab6b526210";

const DEFAULT_RAR_URL: &str = "http://localhost:8080";
const DEFAULT_RAR_HEADER: &str = "DIREC-AI-RAR-API-KEY";
const DEFAULT_RAR_KEY: &str = "rar_c1a09171_ed574d67_af76_23b2b129b8";

/// Clear of both backends' development ports.
const DEFAULT_PORT: &str = "8070";

pub const DEFAULT_TABLE_NAME: &str = "①Recruitment Request Management Copy";
const DEFAULT_LARK_URL: &str = "https://open.larksuite.com";

/// Connection triple for one of the external job services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_url: String,
    pub header_name: String,
    pub api_key: String,
}

impl ServiceConfig {
    /// Rejects a triple with any blank member. Runs before any request is made.
    pub fn validate(&self, service: &str) -> Result<()> {
        if self.api_url.trim().is_empty()
            || self.header_name.trim().is_empty()
            || self.api_key.trim().is_empty()
        {
            bail!(
                "API configuration for {service} is incomplete. Check {prefix}_API_URL, {prefix}_HEADER_NAME and {prefix}_API_KEY",
                prefix = service.to_uppercase()
            );
        }
        Ok(())
    }
}

/// Which host-table backend the process binds to.
#[derive(Debug, Clone, PartialEq)]
pub enum HostBackend {
    Memory,
    Lark {
        api_url: String,
        app_token: String,
        access_token: String,
    },
}

/// Application configuration loaded from environment variables.
/// Unset service values fall back to the development defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub jdw: ServiceConfig,
    pub rar: ServiceConfig,
    pub poll: PollSettings,
    pub http_timeout: Duration,
    pub host_backend: HostBackend,
    pub host_table_name: String,
    pub port: u16,
    pub rust_log: String,
    /// Finished workflow runs kept for lookup.
    pub workflow_retention: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let jdw = ServiceConfig {
            api_url: env_or("JDW_API_URL", DEFAULT_JDW_URL),
            header_name: env_or("JDW_HEADER_NAME", DEFAULT_JDW_HEADER),
            api_key: env_or("JDW_API_KEY", DEFAULT_JDW_KEY),
        };
        jdw.validate("jdw")?;

        let rar = ServiceConfig {
            api_url: env_or("RAR_API_URL", DEFAULT_RAR_URL),
            header_name: env_or("RAR_HEADER_NAME", DEFAULT_RAR_HEADER),
            api_key: env_or("RAR_API_KEY", DEFAULT_RAR_KEY),
        };
        rar.validate("rar")?;

        let interval_ms: u64 = env_or("POLL_INTERVAL_MS", "3000")
            .parse()
            .context("POLL_INTERVAL_MS must be a number of milliseconds")?;
        let max_attempts: u32 = env_or("POLL_MAX_ATTEMPTS", "20")
            .parse()
            .context("POLL_MAX_ATTEMPTS must be a positive integer")?;
        if max_attempts == 0 {
            bail!("POLL_MAX_ATTEMPTS must be at least 1");
        }

        let http_timeout_secs: u64 = env_or("HTTP_TIMEOUT_SECS", "30")
            .parse()
            .context("HTTP_TIMEOUT_SECS must be a number of seconds")?;

        let host_backend = match env_or("HOST_BACKEND", "memory").to_lowercase().as_str() {
            "memory" => HostBackend::Memory,
            "lark" => HostBackend::Lark {
                api_url: env_or("LARK_API_URL", DEFAULT_LARK_URL),
                app_token: require_env("LARK_APP_TOKEN")?,
                access_token: require_env("LARK_ACCESS_TOKEN")?,
            },
            other => bail!("HOST_BACKEND must be 'memory' or 'lark', got '{other}'"),
        };

        let workflow_retention: usize = env_or("WORKFLOW_RETENTION", "100")
            .parse()
            .context("WORKFLOW_RETENTION must be a positive integer")?;
        if workflow_retention == 0 {
            bail!("WORKFLOW_RETENTION must be at least 1");
        }

        let port = env_or("PORT", DEFAULT_PORT)
            .parse::<u16>()
            .context("PORT must be a valid port number")?;
        ensure_distinct_port(port, &[("jdw", &jdw), ("rar", &rar)])?;

        Ok(Config {
            jdw,
            rar,
            poll: PollSettings::from_interval(Duration::from_millis(interval_ms), max_attempts),
            http_timeout: Duration::from_secs(http_timeout_secs),
            host_backend,
            host_table_name: env_or("HOST_TABLE_NAME", DEFAULT_TABLE_NAME),
            port,
            rust_log: env_or("RUST_LOG", "info"),
            workflow_retention,
        })
    }
}

/// Rejects a backend URL that would loop back to this service's own listener.
fn ensure_distinct_port(port: u16, services: &[(&str, &ServiceConfig)]) -> Result<()> {
    for (service, config) in services {
        let url = Url::parse(&config.api_url).with_context(|| {
            format!("{}_API_URL is not a valid URL", service.to_uppercase())
        })?;
        let local = matches!(
            url.host_str(),
            Some("localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]")
        );
        if local && url.port_or_known_default() == Some(port) {
            bail!(
                "{prefix}_API_URL ({}) points at this service's own port {port}. Set PORT or {prefix}_API_URL to a different port",
                config.api_url,
                prefix = service.to_uppercase()
            );
        }
    }
    Ok(())
}

/// Empty values count as unset, matching how the panel treated blank env vars.
fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}
