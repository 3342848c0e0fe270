//! Configuration types for hostsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Search domain used for FQDN synthesis (e.g., "example.com")
    pub search_domain: String,

    /// Projectors to run, one subscription each
    pub projectors: Vec<ProjectorConfig>,

    /// Where rendered snapshots go
    pub sink: SinkConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with no projectors and a stdout sink
    pub fn new(search_domain: impl Into<String>) -> Self {
        Self {
            search_domain: search_domain.into(),
            projectors: Vec::new(),
            sink: SinkConfig::Stdout,
            engine: EngineConfig::default(),
        }
    }

    /// Add a projector
    pub fn with_projector(mut self, projector: ProjectorConfig) -> Self {
        self.projectors.push(projector);
        self
    }

    /// Set the sink
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.search_domain.trim().is_empty() {
            return Err(crate::Error::config("Search domain cannot be empty"));
        }
        if self.search_domain.starts_with('.') || self.search_domain.ends_with('.') {
            return Err(crate::Error::config(format!(
                "Search domain must not start or end with a dot: {}",
                self.search_domain
            )));
        }
        if self.projectors.is_empty() {
            return Err(crate::Error::config("No projectors configured"));
        }

        for projector in &self.projectors {
            projector.validate()?;
        }
        self.sink.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Resource projector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectorConfig {
    /// Ingress routes served by one ingress controller
    Route {
        /// Address every admitted route resolves to
        target_address: String,
        /// Ingress class to admit
        #[serde(default = "default_ingress_class")]
        ingress_class: String,
    },

    /// Services of type LoadBalancer
    LoadBalancer,

    /// Custom projector
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProjectorConfig {
    /// Route projector admitting the default ingress class
    pub fn route(target_address: impl Into<String>) -> Self {
        ProjectorConfig::Route {
            target_address: target_address.into(),
            ingress_class: default_ingress_class(),
        }
    }

    /// Validate the projector configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProjectorConfig::Route {
                target_address,
                ingress_class,
            } => {
                if target_address.trim().is_empty() {
                    return Err(crate::Error::config("Route target address cannot be empty"));
                }
                if ingress_class.trim().is_empty() {
                    return Err(crate::Error::config("Ingress class cannot be empty"));
                }
                Ok(())
            }
            ProjectorConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom projector factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom projector config cannot be null",
                    ));
                }
                Ok(())
            }
            ProjectorConfig::LoadBalancer => Ok(()),
        }
    }

    /// Get the projector type name, as registered in the registry
    pub fn type_name(&self) -> &str {
        match self {
            ProjectorConfig::Route { .. } => "route",
            ProjectorConfig::LoadBalancer => "load_balancer",
            ProjectorConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Snapshot sink configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Copy the snapshot into a pod container, then reload there
    PodExec {
        /// Target pod
        pod_name: String,
        /// Target pod namespace
        #[serde(default = "default_namespace")]
        namespace: String,
        /// Target container
        #[serde(default = "default_container")]
        container: String,
        /// Path of the zone file inside the container
        #[serde(default = "default_target_path")]
        path: String,
        /// Command run in the container after the file is replaced
        #[serde(default = "default_reload_command")]
        reload_command: Vec<String>,
    },

    /// Write the snapshot to a local file
    File {
        /// Path of the zone file
        path: String,
        /// Optional local command run after the file is replaced
        #[serde(default)]
        reload_command: Vec<String>,
    },

    /// Print the snapshot (dry run)
    #[default]
    Stdout,

    /// Custom sink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SinkConfig {
    /// Pod exec sink with the default namespace, container, path and reload command
    pub fn pod_exec(pod_name: impl Into<String>) -> Self {
        SinkConfig::PodExec {
            pod_name: pod_name.into(),
            namespace: default_namespace(),
            container: default_container(),
            path: default_target_path(),
            reload_command: default_reload_command(),
        }
    }

    /// Validate the sink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SinkConfig::PodExec {
                pod_name,
                namespace,
                container,
                path,
                ..
            } => {
                if pod_name.is_empty() {
                    return Err(crate::Error::config("Pod name cannot be empty"));
                }
                if namespace.is_empty() || container.is_empty() {
                    return Err(crate::Error::config(
                        "Pod namespace and container cannot be empty",
                    ));
                }
                if path.is_empty() {
                    return Err(crate::Error::config("Target path cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::File { path, .. } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File sink path cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom sink factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom sink config cannot be null"));
                }
                Ok(())
            }
            SinkConfig::Stdout => Ok(()),
        }
    }

    /// Get the sink type name, as registered in the registry
    pub fn type_name(&self) -> &str {
        match self {
            SinkConfig::PodExec { .. } => "pod_exec",
            SinkConfig::File { .. } => "file",
            SinkConfig::Stdout => "stdout",
            SinkConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Upper bound for the settle delay (one hour)
pub const MAX_SETTLE_DELAY_MS: u64 = 60 * 60 * 1000;

/// Upper bound for the second-based engine delays (one day)
pub const MAX_DELAY_SECS: u64 = 24 * 60 * 60;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a non-urgent flush waits for a burst to settle (in milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Once this long has passed since the last flush, flush without settling
    /// (in seconds)
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,

    /// Delay before the one-shot forced flush after startup (in seconds)
    #[serde(default = "default_startup_flush_delay_secs")]
    pub startup_flush_delay_secs: u64,

    /// Capacity of the coalescer signal queue
    ///
    /// Producers block rather than drop when it is full.
    #[serde(default = "default_signal_queue_capacity")]
    pub signal_queue_capacity: usize,

    /// Retries of a failed snapshot write before the engine gives up
    #[serde(default)]
    pub max_retries: usize,

    /// Delay between sink retries (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.signal_queue_capacity == 0 {
            return Err(crate::Error::config("Signal queue capacity must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(crate::Error::config(format!(
                "Settle delay cannot exceed {} ms",
                MAX_SETTLE_DELAY_MS
            )));
        }
        for (name, secs) in [
            ("Max staleness", self.max_staleness_secs),
            ("Startup flush delay", self.startup_flush_delay_secs),
            ("Retry delay", self.retry_delay_secs),
        ] {
            if secs > MAX_DELAY_SECS {
                return Err(crate::Error::config(format!(
                    "{} cannot exceed {} seconds",
                    name, MAX_DELAY_SECS
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            max_staleness_secs: default_max_staleness_secs(),
            startup_flush_delay_secs: default_startup_flush_delay_secs(),
            signal_queue_capacity: default_signal_queue_capacity(),
            max_retries: 0,
            retry_delay_secs: default_retry_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_container() -> String {
    "pihole".to_string()
}

fn default_target_path() -> String {
    "/etc/pihole/kube.list".to_string()
}

fn default_reload_command() -> Vec<String> {
    vec!["pihole".to_string(), "restartdns".to_string()]
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_max_staleness_secs() -> u64 {
    60
}

fn default_startup_flush_delay_secs() -> u64 {
    60
}

fn default_signal_queue_capacity() -> usize {
    1000
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}
