//! Operator configuration read from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::driver::IngressSchema;
use crate::error::ControllerError;

/// Namespace the admin API writes Functions into when no namespace is watched
pub const DEFAULT_FUNCTION_NAMESPACE: &str = "openfaas-fn";

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_TIMEOUT_SECONDS: u64 = 8;
const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Probe timings for function containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: i32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 2,
            timeout_seconds: 1,
            period_seconds: 2,
        }
    }
}

/// How Functions are turned into Deployments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    /// Port the function's watchdog listens on
    pub runtime_http_port: i32,
    /// Use HTTP probes instead of exec probes
    pub http_probe: bool,
    pub readiness_probe: ProbeConfig,
    pub liveness_probe: ProbeConfig,
    /// One of `Always`, `IfNotPresent` or `Never`
    pub image_pull_policy: String,
    /// Run function containers as a non-root user
    pub set_non_root_user: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            runtime_http_port: 8080,
            http_probe: true,
            readiness_probe: ProbeConfig::default(),
            liveness_probe: ProbeConfig::default(),
            image_pull_policy: "Always".to_string(),
            set_non_root_user: false,
        }
    }
}

/// Admin HTTP server settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Upper bound for a single request
    pub fn request_timeout(&self) -> Duration {
        self.read_timeout.max(self.write_timeout)
    }
}

/// Complete operator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace every cache and client is restricted to; `None` watches all
    pub watch_namespace: Option<String>,
    /// Worker tasks per controller
    pub workers: usize,
    /// Forces the Ingress schema instead of discovering it
    pub ingress_schema: Option<IngressSchema>,
    pub server: ServerConfig,
    pub deployment: DeploymentConfig,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_namespace = lookup("WATCH_NAMESPACE")
            .or_else(|| lookup("function_namespace"))
            .filter(|ns| !ns.trim().is_empty());

        let workers = parse_or(&lookup, "WORKERS", DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "WORKERS must be at least 1".to_string(),
            ));
        }

        let ingress_schema = match lookup("INGRESS_API_VERSION").filter(|v| !v.is_empty()) {
            Some(version) => Some(IngressSchema::from_api_version(&version).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("Unsupported INGRESS_API_VERSION: {version}"))
            })?),
            None => None,
        };

        let server = ServerConfig {
            port: parse_or(&lookup, "port", DEFAULT_PORT),
            read_timeout: Duration::from_secs(parse_or(&lookup, "read_timeout", DEFAULT_TIMEOUT_SECONDS)),
            write_timeout: Duration::from_secs(parse_or(&lookup, "write_timeout", DEFAULT_TIMEOUT_SECONDS)),
        };

        let defaults = DeploymentConfig::default();
        let image_pull_policy = lookup("image_pull_policy").unwrap_or(defaults.image_pull_policy);
        if !PULL_POLICIES.contains(&image_pull_policy.as_str()) {
            return Err(ControllerError::InvalidConfig(format!(
                "Invalid image_pull_policy configured: {image_pull_policy}"
            )));
        }

        let deployment = DeploymentConfig {
            runtime_http_port: defaults.runtime_http_port,
            http_probe: parse_bool(&lookup, "http_probe", defaults.http_probe),
            readiness_probe: probe_config(&lookup, "readiness"),
            liveness_probe: probe_config(&lookup, "liveness"),
            image_pull_policy,
            set_non_root_user: parse_bool(&lookup, "set_nonroot_user", defaults.set_non_root_user),
        };

        Ok(Self {
            watch_namespace,
            workers,
            ingress_schema,
            server,
            deployment,
        })
    }

    /// Namespace the admin API reads and writes Functions in
    pub fn function_namespace(&self) -> &str {
        self.watch_namespace.as_deref().unwrap_or(DEFAULT_FUNCTION_NAMESPACE)
    }
}

fn probe_config<F>(lookup: &F, prefix: &str) -> ProbeConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ProbeConfig::default();
    ProbeConfig {
        initial_delay_seconds: parse_or(lookup, &format!("{prefix}_probe_initial_delay_seconds"), defaults.initial_delay_seconds),
        timeout_seconds: parse_or(lookup, &format!("{prefix}_probe_timeout_seconds"), defaults.timeout_seconds),
        period_seconds: parse_or(lookup, &format!("{prefix}_probe_period_seconds"), defaults.period_seconds),
    }
}

/// Parse a variable, keeping the default when it is unset or unparsable
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {:?}", name, raw);
            default
        }),
        None => default,
    }
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
