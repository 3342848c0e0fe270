// # hostsyncd - hosts-list sync daemon
//
// Thin integration layer over hostsync-core:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering projectors, sinks and resource sources
// 4. Running the sync engine until SIGINT/SIGTERM
//
// No synchronization logic lives here.
//
// ## Configuration
//
// ### Projection
// - `HOSTSYNC_SEARCH_DOMAIN`: Search domain appended to service names (required)
// - `HOSTSYNC_INGRESS_IP`: Address ingress hosts resolve to (required for `ingress`)
// - `HOSTSYNC_INGRESS_CLASS`: Admitted ingress class (default: nginx)
// - `HOSTSYNC_RESOURCES`: Comma-separated kinds to watch (default: ingress,service)
//
// ### Sink
// - `HOSTSYNC_SINK_TYPE`: pod_exec, file or stdout (default: pod_exec)
// - `HOSTSYNC_POD_NAME`: Target pod (default: $PIHOLE_POD_NAME, then $HOSTNAME)
// - `HOSTSYNC_POD_NAMESPACE`: Target pod namespace (default: default)
// - `HOSTSYNC_POD_CONTAINER`: Target container (default: pihole)
// - `HOSTSYNC_TARGET_PATH`: Zone file path (default: /etc/pihole/kube.list)
// - `HOSTSYNC_RELOAD_COMMAND`: Reload command, split on whitespace
//
// ### Cluster access
// - `HOSTSYNC_API_SERVER` (or `SERVER_IP`): API server address, used when
//   not running in a cluster
// - `HOSTSYNC_API_TOKEN` (or `SERVICE_ACCOUNT_TOKEN`): Bearer token for it
//
// ### Engine
// - `HOSTSYNC_SETTLE_DELAY_MS`: Burst settle delay
// - `HOSTSYNC_MAX_STALENESS_SECS`: Longest a change may wait before a forced write
// - `HOSTSYNC_MAX_RETRIES`: Sink retries before giving up (default: 0)
// - `HOSTSYNC_RETRY_DELAY_SECS`: Delay between sink retries
// - `HOSTSYNC_LOG_LEVEL`: trace, debug, info, warn or error (default: info)
//
// ## Example
//
// ```bash
// export HOSTSYNC_SEARCH_DOMAIN=home.lan
// export HOSTSYNC_INGRESS_IP=192.168.1.10
// export HOSTSYNC_POD_NAME=pihole-0
//
// hostsyncd
// ```

use anyhow::{Context, Result};
use hostsync_core::{EngineConfig, PluginRegistry, ProjectorConfig, SinkConfig, SyncConfig, SyncEngine};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (e.g. the sink kept failing)
#[derive(Debug, Clone, Copy)]
enum HostsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<HostsyncExitCode> for ExitCode {
    fn from(code: HostsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    search_domain: String,
    ingress_ip: Option<String>,
    ingress_class: Option<String>,
    resources: Vec<String>,
    sink_type: String,
    pod_name: Option<String>,
    pod_namespace: Option<String>,
    pod_container: Option<String>,
    target_path: Option<String>,
    reload_command: Option<Vec<String>>,
    api_server: Option<String>,
    api_token: Option<String>,
    settle_delay_ms: Option<u64>,
    max_staleness_secs: Option<u64>,
    max_retries: Option<usize>,
    retry_delay_secs: Option<u64>,
    log_level: String,
}

/// Parse an optional numeric variable
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a number, got '{}': {}", name, raw, e)),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration through `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            search_domain: lookup("HOSTSYNC_SEARCH_DOMAIN").unwrap_or_default(),
            ingress_ip: lookup("HOSTSYNC_INGRESS_IP"),
            ingress_class: lookup("HOSTSYNC_INGRESS_CLASS"),
            resources: lookup("HOSTSYNC_RESOURCES")
                .unwrap_or_else(|| "ingress,service".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            sink_type: lookup("HOSTSYNC_SINK_TYPE").unwrap_or_else(|| "pod_exec".to_string()),
            pod_name: lookup("HOSTSYNC_POD_NAME")
                .or_else(|| lookup("PIHOLE_POD_NAME"))
                .or_else(|| lookup("HOSTNAME")),
            pod_namespace: lookup("HOSTSYNC_POD_NAMESPACE"),
            pod_container: lookup("HOSTSYNC_POD_CONTAINER"),
            target_path: lookup("HOSTSYNC_TARGET_PATH"),
            reload_command: lookup("HOSTSYNC_RELOAD_COMMAND")
                .map(|s| s.split_whitespace().map(str::to_string).collect()),
            api_server: lookup("HOSTSYNC_API_SERVER").or_else(|| lookup("SERVER_IP")),
            api_token: lookup("HOSTSYNC_API_TOKEN").or_else(|| lookup("SERVICE_ACCOUNT_TOKEN")),
            settle_delay_ms: parse_var(&lookup, "HOSTSYNC_SETTLE_DELAY_MS")?,
            max_staleness_secs: parse_var(&lookup, "HOSTSYNC_MAX_STALENESS_SECS")?,
            max_retries: parse_var(&lookup, "HOSTSYNC_MAX_RETRIES")?,
            retry_delay_secs: parse_var(&lookup, "HOSTSYNC_RETRY_DELAY_SECS")?,
            log_level: lookup("HOSTSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the variables that have no counterpart in [`SyncConfig`]
    fn validate(&self) -> Result<()> {
        if self.search_domain.is_empty() {
            anyhow::bail!(
                "HOSTSYNC_SEARCH_DOMAIN is required. \
                Set it via: export HOSTSYNC_SEARCH_DOMAIN=home.lan"
            );
        }

        if self.resources.is_empty() {
            anyhow::bail!("HOSTSYNC_RESOURCES must name at least one of: ingress, service");
        }
        for kind in &self.resources {
            match kind.as_str() {
                "ingress" | "service" => {}
                other => anyhow::bail!(
                    "HOSTSYNC_RESOURCES entry '{}' is not supported. \
                    Supported kinds: ingress, service",
                    other
                ),
            }
        }

        if self.resources.iter().any(|k| k == "ingress") && self.ingress_ip.is_none() {
            anyhow::bail!(
                "HOSTSYNC_INGRESS_IP is required when watching ingresses. \
                Set it via: export HOSTSYNC_INGRESS_IP=192.168.1.10"
            );
        }

        match self.sink_type.as_str() {
            "pod_exec" if self.pod_name.is_none() => anyhow::bail!(
                "HOSTSYNC_POD_NAME is required when HOSTNAME is not set"
            ),
            "file" if self.target_path.is_none() => anyhow::bail!(
                "HOSTSYNC_TARGET_PATH is required when HOSTSYNC_SINK_TYPE=file"
            ),
            "pod_exec" | "file" | "stdout" => {}
            other => anyhow::bail!(
                "HOSTSYNC_SINK_TYPE '{}' is not supported. \
                Supported types: pod_exec, file, stdout",
                other
            ),
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "HOSTSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn sink_config(&self) -> SinkConfig {
        match self.sink_type.as_str() {
            "file" => SinkConfig::File {
                path: self.target_path.clone().unwrap_or_default(),
                reload_command: self.reload_command.clone().unwrap_or_default(),
            },
            "stdout" => SinkConfig::Stdout,
            _ => {
                let mut sink = SinkConfig::pod_exec(self.pod_name.clone().unwrap_or_default());
                if let SinkConfig::PodExec {
                    namespace,
                    container,
                    path,
                    reload_command,
                    ..
                } = &mut sink
                {
                    if let Some(value) = &self.pod_namespace {
                        *namespace = value.clone();
                    }
                    if let Some(value) = &self.pod_container {
                        *container = value.clone();
                    }
                    if let Some(value) = &self.target_path {
                        *path = value.clone();
                    }
                    if let Some(value) = &self.reload_command {
                        *reload_command = value.clone();
                    }
                }
                sink
            }
        }
    }

    /// Build the library configuration
    fn to_sync_config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::new(self.search_domain.clone()).with_sink(self.sink_config());

        for kind in &self.resources {
            let projector = match kind.as_str() {
                "ingress" => {
                    let mut route = ProjectorConfig::route(self.ingress_ip.clone().unwrap_or_default());
                    if let (ProjectorConfig::Route { ingress_class, .. }, Some(class)) =
                        (&mut route, &self.ingress_class)
                    {
                        *ingress_class = class.clone();
                    }
                    route
                }
                _ => ProjectorConfig::LoadBalancer,
            };
            config = config.with_projector(projector);
        }

        let defaults = EngineConfig::default();
        config.engine = EngineConfig {
            settle_delay_ms: self.settle_delay_ms.unwrap_or(defaults.settle_delay_ms),
            max_staleness_secs: self.max_staleness_secs.unwrap_or(defaults.max_staleness_secs),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_secs: self.retry_delay_secs.unwrap_or(defaults.retry_delay_secs),
            ..defaults
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    if env::args().skip(1).any(|arg| arg == "-v" || arg == "--version") {
        println!("hostsyncd {}", env!("CARGO_PKG_VERSION"));
        return HostsyncExitCode::CleanShutdown.into();
    }

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    let sync_config = match config.to_sync_config() {
        Ok(sync_config) => sync_config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    info!("Starting hostsyncd {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Watching {} for search domain {}",
        config.resources.join(", "),
        sync_config.search_domain
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let engine = match build_engine(&config, &sync_config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return HostsyncExitCode::ConfigError;
            }
        };

        match engine.run().await {
            Ok(()) => {
                info!("Shutting down daemon");
                HostsyncExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Daemon error: {}", e);
                HostsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Register plugins and build the engine
///
/// One API client is shared by the sources and the pod exec sink.
#[cfg_attr(not(feature = "kube"), allow(unused_variables))]
async fn build_engine(daemon: &Config, config: &SyncConfig) -> Result<SyncEngine> {
    let registry = PluginRegistry::with_builtin_projectors();

    #[cfg(feature = "exec")]
    {
        info!("Registering local sinks");
        hostsync_sink_exec::register(&registry);
    }

    #[cfg(feature = "kube")]
    {
        let client =
            hostsync_source_kube::connect(daemon.api_server.as_deref(), daemon.api_token.as_deref())
                .await
                .context("cannot reach the cluster API")?;

        #[cfg(feature = "exec")]
        {
            info!("Registering pod exec sink");
            hostsync_sink_exec::register_with_client(&registry, client.clone());
        }

        info!("Registering Kubernetes sources");
        hostsync_source_kube::register_with_client(&registry, client);
    }

    let (engine, mut events) = SyncEngine::from_config(config, &registry)?;

    // Engine events are only traced here
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::trace!("Engine event: {:?}", event);
        }
    });

    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[
            ("HOSTSYNC_SEARCH_DOMAIN", "home.lan"),
            ("HOSTSYNC_INGRESS_IP", "192.168.1.10"),
            ("HOSTNAME", "pihole-0"),
        ])
        .unwrap();
        cfg.validate().unwrap();

        let sync = cfg.to_sync_config().unwrap();
        assert_eq!(sync.projectors.len(), 2);
        assert_eq!(sync.projectors[0], ProjectorConfig::route("192.168.1.10"));
        assert_eq!(sync.projectors[1], ProjectorConfig::LoadBalancer);
        assert_eq!(sync.sink, SinkConfig::pod_exec("pihole-0"));
        assert_eq!(sync.engine, EngineConfig::default());
        assert_eq!(cfg.api_server, None);
    }

    #[test]
    fn test_out_of_cluster_variables() {
        let cfg = config(&[
            ("HOSTSYNC_SEARCH_DOMAIN", "home.lan"),
            ("HOSTSYNC_INGRESS_IP", "192.168.1.10"),
            ("SERVER_IP", "192.168.1.2:6443"),
            ("SERVICE_ACCOUNT_TOKEN", "sa-token"),
            ("PIHOLE_POD_NAME", "pihole-7d9f"),
            ("HOSTNAME", "workstation"),
        ])
        .unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.api_server.as_deref(), Some("192.168.1.2:6443"));
        assert_eq!(cfg.api_token.as_deref(), Some("sa-token"));
        assert_eq!(cfg.to_sync_config().unwrap().sink, SinkConfig::pod_exec("pihole-7d9f"));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("HOSTSYNC_SEARCH_DOMAIN", "home.lan"),
            ("HOSTSYNC_RESOURCES", "service"),
            ("HOSTSYNC_SINK_TYPE", "file"),
            ("HOSTSYNC_TARGET_PATH", "/etc/hosts.d/kube"),
            ("HOSTSYNC_RELOAD_COMMAND", "systemctl  reload dnsmasq"),
            ("HOSTSYNC_MAX_RETRIES", "3"),
            ("HOSTSYNC_SETTLE_DELAY_MS", "250"),
        ])
        .unwrap();
        cfg.validate().unwrap();

        let sync = cfg.to_sync_config().unwrap();
        assert_eq!(sync.projectors, vec![ProjectorConfig::LoadBalancer]);
        assert_eq!(
            sync.sink,
            SinkConfig::File {
                path: "/etc/hosts.d/kube".to_string(),
                reload_command: vec!["systemctl".into(), "reload".into(), "dnsmasq".into()],
            }
        );
        assert_eq!(sync.engine.max_retries, 3);
        assert_eq!(sync.engine.settle_delay_ms, 250);
    }

    #[test]
    fn test_ingress_requires_address() {
        let cfg = config(&[("HOSTSYNC_SEARCH_DOMAIN", "home.lan"), ("HOSTNAME", "pihole-0")]).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("HOSTSYNC_INGRESS_IP"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("HOSTSYNC_MAX_RETRIES", "many")]).is_err());

        let cfg = config(&[
            ("HOSTSYNC_SEARCH_DOMAIN", "home.lan"),
            ("HOSTSYNC_RESOURCES", "gateway"),
        ])
        .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = config(&[
            ("HOSTSYNC_SEARCH_DOMAIN", "home.lan."),
            ("HOSTSYNC_RESOURCES", "service"),
            ("HOSTSYNC_SINK_TYPE", "stdout"),
        ])
        .unwrap();
        cfg.validate().unwrap();
        assert!(cfg.to_sync_config().is_err());
    }
}
