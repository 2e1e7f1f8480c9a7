//! Hot reload of the relay configuration file.
//!
//! # Data Flow
//! ```text
//! notify (parent directory)
//!     → events naming the config file only
//!     → debounce task: wait for the burst to go quiet
//!     → load_config → validated RelayConfig on the update channel
//! ```
//!
//! # Design Decisions
//! - The parent directory is watched, so editors that save by writing a
//!   temp file and renaming it over the original keep being seen
//! - A burst of events yields one reload; invalid files keep the current config

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

/// Keeps the watch alive; dropping it stops reloads.
pub struct ConfigWatch {
    _watcher: RecommendedWatcher,
    reloader: JoinHandle<()>,
}

impl Drop for ConfigWatch {
    fn drop(&mut self) {
        self.reloader.abort();
    }
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver of validated reloads.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn run(self) -> Result<ConfigWatch, notify::Error> {
        let Some(file_name) = self.path.file_name().map(OsString::from) else {
            return Err(notify::Error::generic("config path has no file name"));
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (touched_tx, touched_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file_name) => {
                    let _ = touched_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), debounce_ms = self.debounce.as_millis() as u64, "Watching config file");
        let reloader = tokio::spawn(reload_loop(self.path, self.debounce, touched_rx, self.update_tx));
        Ok(ConfigWatch {
            _watcher: watcher,
            reloader,
        })
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()))
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut touched: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<RelayConfig>,
) {
    while touched.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, touched.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match load_config(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Config reloaded");
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => tracing::error!(error = %e, "Config reload failed; keeping current configuration"),
        }
    }
}

/// Log which sections of a reloaded config differ but cannot be applied live.
pub fn log_restart_required(current: &RelayConfig, next: &RelayConfig) {
    if current.breaker != next.breaker {
        tracing::warn!("breaker settings changed; restart required to apply");
    }
    if current.event_bus != next.event_bus {
        tracing::warn!("event_bus settings changed; restart required to apply");
    }
    if current.connection != next.connection {
        tracing::warn!("connection settings changed; restart required to apply");
    }
    if current.observability != next.observability {
        tracing::warn!("observability settings changed; restart required to apply");
    }
}
