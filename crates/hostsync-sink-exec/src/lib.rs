// # Snapshot Sinks
//
// This crate provides the snapshot sinks for hostsync:
//
// - **PodExecSink**: copies the zone into a DNS server pod through the
//   Kubernetes exec API, then reloads the server in the same container
// - **FileSink**: replaces a local file, then runs an optional local command
// - **StdoutSink**: prints the zone (dry run)
//
// ## Atomicity
//
// Both file-replacing sinks write a temporary file next to the target and
// rename it into place, so the DNS server never reads a half-written zone.
// Replacing and reloading is one operation: if the reload fails, the write
// fails.
//
// ## Registration
//
// ```rust,ignore
// let registry = PluginRegistry::with_builtin_projectors();
// let client = hostsync_source_kube::connect(None, None).await?;
// hostsync_sink_exec::register_with_client(&registry, client);
// ```

use hostsync_core::PluginRegistry;
use hostsync_core::config::SinkConfig;
use hostsync_core::traits::{SinkFactory, SnapshotSink};
use hostsync_core::{Error, Result};

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::Client;
use kube::api::{Api, AttachParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Shell script run in the container
///
/// `$1` is the target path and `$2` the snapshot size in bytes. Reading an
/// exact byte count lets the copy finish without waiting for stdin to close.
const REPLACE_SCRIPT: &str = r#"head -c "$2" > "$1.tmp" && mv "$1.tmp" "$1""#;

/// Failure of a command run in a pod
#[derive(Debug, thiserror::Error)]
enum ExecError {
    #[error("failed to start exec in {pod}: {source}")]
    Start {
        pod: String,
        #[source]
        source: kube::Error,
    },

    #[error("exec stream failed: {0}")]
    Stream(#[from] std::io::Error),

    #[error("exec connection failed: {0}")]
    Join(String),

    #[error("command failed: {0}")]
    Failed(String),
}

/// Failure of a local command
#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run a local command and require success
async fn run_command(program: &str, args: &[String]) -> std::result::Result<(), CommandError> {
    debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(CommandError::Exit {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Interpret the status the API server reports when an exec ends
fn check_status(status: Option<Status>, stderr: &str) -> std::result::Result<(), ExecError> {
    match status {
        Some(status) if status.status.as_deref() == Some("Success") => Ok(()),
        Some(status) => {
            let mut message = status
                .message
                .or(status.reason)
                .unwrap_or_else(|| "command failed".to_string());
            if !stderr.is_empty() {
                message = format!("{}: {}", message, stderr);
            }
            Err(ExecError::Failed(message))
        }
        None => Err(ExecError::Failed("no exit status reported".to_string())),
    }
}

/// The container a [`PodExecSink`] writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    /// Pod running the DNS server
    pub pod_name: String,
    /// Namespace of that pod
    pub namespace: String,
    /// Container running the DNS server
    pub container: String,
    /// Zone file path inside the container
    pub path: String,
    /// Command that makes the server re-read the zone
    pub reload_command: Vec<String>,
}

impl PodTarget {
    /// Command that replaces the zone file with `len` bytes read from stdin
    fn copy_command(&self, len: usize) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            REPLACE_SCRIPT.to_string(),
            "sh".to_string(),
            self.path.clone(),
            len.to_string(),
        ]
    }
}

/// Copies the zone into a pod container and reloads the DNS server there
pub struct PodExecSink {
    pods: Api<Pod>,
    target: PodTarget,
}

impl PodExecSink {
    /// Create a new pod exec sink
    ///
    /// # Parameters
    ///
    /// - `client`: Kubernetes API client
    /// - `target`: Pod, container, zone path and reload command
    pub fn new(client: Client, target: PodTarget) -> Self {
        Self {
            pods: Api::namespaced(client, &target.namespace),
            target,
        }
    }

    /// The container this sink writes into
    pub fn target(&self) -> &PodTarget {
        &self.target
    }

    /// Run `command` in the target container, optionally feeding `stdin`
    async fn exec(&self, command: Vec<String>, stdin: Option<&str>) -> std::result::Result<(), ExecError> {
        debug!(
            "Exec in {}/{}: {}",
            self.target.pod_name,
            self.target.container,
            command.join(" ")
        );

        let params = AttachParams::default()
            .container(self.target.container.clone())
            .stdin(stdin.is_some())
            .stdout(false)
            .stderr(true);

        let mut process = self
            .pods
            .exec(&self.target.pod_name, command, &params)
            .await
            .map_err(|source| ExecError::Start {
                pod: self.target.pod_name.clone(),
                source,
            })?;
        let status = process.take_status();

        if let (Some(content), Some(mut writer)) = (stdin, process.stdin()) {
            writer.write_all(content.as_bytes()).await?;
            writer.flush().await?;
        }

        let mut stderr = String::new();
        if let Some(mut reader) = process.stderr() {
            reader.read_to_string(&mut stderr).await?;
        }

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        process
            .join()
            .await
            .map_err(|e| ExecError::Join(e.to_string()))?;

        check_status(status, stderr.trim())
    }
}

#[async_trait::async_trait]
impl SnapshotSink for PodExecSink {
    async fn write_snapshot(&self, content: &str) -> Result<()> {
        self.exec(self.target.copy_command(content.len()), Some(content))
            .await
            .map_err(|e| Error::sink_failed("pod_exec", e.to_string()))?;

        if !self.target.reload_command.is_empty() {
            self.exec(self.target.reload_command.clone(), None)
                .await
                .map_err(|e| Error::sink_failed("pod_exec", format!("reload failed: {}", e)))?;
        }

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "pod_exec"
    }
}

/// Replaces a local zone file and runs an optional local reload command
pub struct FileSink {
    path: PathBuf,
    reload_command: Vec<String>,
}

impl FileSink {
    /// Create a new file sink
    pub fn new(path: impl Into<PathBuf>, reload_command: Vec<String>) -> Self {
        Self {
            path: path.into(),
            reload_command,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn replace(&self, content: &str) -> std::io::Result<()> {
        let temp = self.temp_path();
        tokio::fs::write(&temp, content).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Path of the zone file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SnapshotSink for FileSink {
    async fn write_snapshot(&self, content: &str) -> Result<()> {
        self.replace(content).await.map_err(|e| {
            Error::sink_failed("file", format!("failed to replace {}: {}", self.path.display(), e))
        })?;

        if let Some((program, args)) = self.reload_command.split_first() {
            run_command(program, args)
                .await
                .map_err(|e| Error::sink_failed("file", format!("reload failed: {}", e)))?;
        }

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "file"
    }
}

/// Prints each snapshot to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait::async_trait]
impl SnapshotSink for StdoutSink {
    async fn write_snapshot(&self, content: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(content.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "stdout"
    }
}

/// Settings accepted by the file sink in a `custom` sink config
#[derive(Debug, Deserialize)]
struct FileSettings {
    path: String,
    #[serde(default)]
    reload_command: Vec<String>,
}

/// Settings accepted by the pod exec sink in a `custom` sink config
#[derive(Debug, Deserialize)]
struct PodExecSettings {
    pod_name: String,
    namespace: String,
    container: String,
    path: String,
    #[serde(default)]
    reload_command: Vec<String>,
}

/// Build the pod target from a typed or custom sink config
fn pod_target(config: &SinkConfig) -> Result<PodTarget> {
    match config {
        SinkConfig::PodExec {
            pod_name,
            namespace,
            container,
            path,
            reload_command,
        } => Ok(PodTarget {
            pod_name: pod_name.clone(),
            namespace: namespace.clone(),
            container: container.clone(),
            path: path.clone(),
            reload_command: reload_command.clone(),
        }),
        SinkConfig::Custom { config, .. } => {
            let settings: PodExecSettings = serde_json::from_value(config.clone())?;
            Ok(PodTarget {
                pod_name: settings.pod_name,
                namespace: settings.namespace,
                container: settings.container,
                path: settings.path,
                reload_command: settings.reload_command,
            })
        }
        _ => Err(Error::config("Invalid config for pod_exec sink")),
    }
}

/// Factory for creating pod exec sinks sharing one API client
pub struct PodExecSinkFactory {
    client: Client,
}

impl PodExecSinkFactory {
    /// Create a factory whose sinks use `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl SinkFactory for PodExecSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Arc<dyn SnapshotSink>> {
        let target = pod_target(config)?;
        Ok(Arc::new(PodExecSink::new(self.client.clone(), target)))
    }
}

/// Factory for creating file sinks
pub struct FileSinkFactory;

impl SinkFactory for FileSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Arc<dyn SnapshotSink>> {
        match config {
            SinkConfig::File {
                path,
                reload_command,
            } => Ok(Arc::new(FileSink::new(path, reload_command.clone()))),
            SinkConfig::Custom { config, .. } => {
                let settings: FileSettings = serde_json::from_value(config.clone())?;
                Ok(Arc::new(FileSink::new(settings.path, settings.reload_command)))
            }
            _ => Err(Error::config("Invalid config for file sink")),
        }
    }
}

/// Factory for creating stdout sinks
pub struct StdoutSinkFactory;

impl SinkFactory for StdoutSinkFactory {
    fn create(&self, _config: &SinkConfig) -> Result<Arc<dyn SnapshotSink>> {
        Ok(Arc::new(StdoutSink))
    }
}

/// Register the sinks that need no cluster access (`file`, `stdout`)
///
/// # Example
///
/// ```rust
/// use hostsync_core::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// hostsync_sink_exec::register(&registry);
/// assert!(registry.has_sink("file"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_sink("file", Box::new(FileSinkFactory));
    registry.register_sink("stdout", Box::new(StdoutSinkFactory));
}

/// Register every sink, with `pod_exec` using `client`
pub fn register_with_client(registry: &PluginRegistry, client: Client) {
    register(registry);
    registry.register_sink("pod_exec", Box::new(PodExecSinkFactory::new(client)));
}
