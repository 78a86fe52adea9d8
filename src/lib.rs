pub mod catalog;
pub mod config;
pub mod mcp_client;
pub mod reconciler;
pub mod registry;

#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::sync::watch;

use catalog::{CatalogDatabase, SharedCatalog};
use config::{expand_tilde, LogFormat, RegistryConfig};
use mcp_client::McpClient;
use reconciler::{AgentProber, HealthReconciler};

/// Return the platform-standard data directory for the registry.
///
/// - macOS: `~/Library/Application Support/agent-registry/`
/// - Linux: `$XDG_DATA_HOME/agent-registry/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.agent-registry/` when neither can be resolved.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("agent-registry");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-registry")
}

/// Catalog path: the configured one (tilde-expanded) or `registry.db` in
/// the data directory.
fn resolve_db_path(config: &RegistryConfig, data_dir: &Path) -> PathBuf {
    match config.database_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(expand_tilde(path)),
        _ => data_dir.join("registry.db"),
    }
}

/// Initialize the tracing subscriber, writing to `registry.log` in the data
/// directory.
///
/// The previous logs are rotated first (keeping 3), and every line is
/// flushed as it is written.
fn init_tracing(format: LogFormat) -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let log_path = log_dir.join("registry.log");
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;
    let writer = FlushingWriter::new(log_file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agent_registry=info,warn"));

    let installed = match format {
        LogFormat::Json => fmt::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .try_init(),
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== agent-registry starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `registry.log` → `.1` → `.2` → … → `.{keep}`.
///
/// Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A file writer that flushes after every write.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Load configuration, open the catalog and run the health reconciler
/// until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let (config, config_path) = config::load_or_default(&cwd)?;

    init_tracing(config.log_format)?;
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration"),
        None => tracing::info!("no configuration file found, using defaults"),
    }

    let db_path = resolve_db_path(&config, &data_dir());
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = CatalogDatabase::open(&db_path.to_string_lossy())
        .with_context(|| format!("failed to open catalog at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "catalog opened");
    let store = SharedCatalog::new(db);

    let client = McpClient::new(&config.client)?;
    let prober = AgentProber::from_config(&config.client, &config.agent_health)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = HealthReconciler::new(store, client, prober, &config).spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "health loop ended abnormally");
        }
    }
    tracing::info!("=== agent-registry stopped ===");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_defaults_to_data_dir() {
        let config = RegistryConfig::default();
        let path = resolve_db_path(&config, Path::new("/var/lib/registry"));
        assert_eq!(path, PathBuf::from("/var/lib/registry/registry.db"));
    }

    #[test]
    fn test_resolve_db_path_uses_configured_path() {
        let config = RegistryConfig {
            database_path: Some(" /tmp/catalog.db ".into()),
            ..Default::default()
        };
        let path = resolve_db_path(&config, Path::new("/unused"));
        assert_eq!(path, PathBuf::from("/tmp/catalog.db"));
    }

    #[test]
    fn test_rotate_log_file_keeps_chain() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("registry.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("registry.log.1"), "previous").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("registry.log.1")).unwrap(), "current");
        assert_eq!(std::fs::read_to_string(dir.path().join("registry.log.2")).unwrap(), "previous");
    }
}
