//! Live preference reloading
//!
//! Watches the directory holding the config file so editors that replace the
//! file instead of writing it in place are still seen. A burst of file events
//! is coalesced into one re-read once the file has been quiet for the
//! debounce window; only preference values that actually changed are
//! reported. Port, surface and timing sections need a restart.

use anyhow::{anyhow, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;
use crate::prefs::PreferenceValues;

/// Preference values that differ from the last applied config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceUpdate {
    pub changed: PreferenceValues,
    /// Sections edited on disk that only take effect after a restart
    pub restart_required: Vec<&'static str>,
}

impl PreferenceUpdate {
    pub fn between(old: &AppConfig, new: &AppConfig) -> Self {
        let changed = new
            .preferences
            .iter()
            .filter(|(name, value)| old.preferences.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut restart_required = Vec::new();
        if old.midi != new.midi {
            restart_required.push("midi");
        }
        if old.surface != new.surface {
            restart_required.push("surface");
        }
        if old.timing != new.timing {
            restart_required.push("timing");
        }

        Self {
            changed,
            restart_required,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.restart_required.is_empty()
    }
}

fn touches_file(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Yields a [`PreferenceUpdate`] each time the config file's preferences change
pub struct PreferenceWatcher {
    _watcher: RecommendedWatcher,
    path: String,
    quiet: Duration,
    touched: mpsc::UnboundedReceiver<()>,
    /// Set once an event arrived and cleared after the re-read, so a
    /// cancelled `next_update` resumes where it stopped
    dirty: bool,
    applied: AppConfig,
}

impl PreferenceWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: impl Into<String>, quiet: Duration) -> Result<(Self, AppConfig)> {
        let path = config_path.into();
        let initial = AppConfig::load(&path)
            .await
            .context("Failed to load initial config")?;

        let file_name = Path::new(&path)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| anyhow!("Config path has no file name: {}", path))?;
        let dir = match Path::new(&path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify calls back on its own thread; an unbounded send never blocks it
        let (tx, touched) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches_file(&event, &file_name) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => error!("Watch error: {}", e),
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!("Watching {} for preference changes", path);
        Ok((
            Self {
                _watcher: watcher,
                path,
                quiet,
                touched,
                dirty: false,
                applied: initial.clone(),
            },
            initial,
        ))
    }

    /// Wait for the next effective change; `None` once the watcher is closed
    ///
    /// Unreadable or invalid files are skipped and the last good config
    /// stays the baseline. Cancel safe: usable as a `tokio::select!` branch.
    pub async fn next_update(&mut self) -> Option<PreferenceUpdate> {
        loop {
            if !self.dirty {
                self.touched.recv().await?;
                self.dirty = true;
            }
            while let Ok(Some(())) = tokio::time::timeout(self.quiet, self.touched.recv()).await {}
            debug!("Config quiet for {:?}, re-reading {}", self.quiet, self.path);

            let loaded = AppConfig::load(&self.path).await;
            self.dirty = false;
            let config = match loaded {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring config change (keeping old values): {:#}", e);
                    continue;
                }
            };

            let update = PreferenceUpdate::between(&self.applied, &config);
            self.applied = config;
            if update.is_empty() {
                debug!("Config rewritten without changes");
                continue;
            }
            return Some(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PreferenceValue;
    use std::fs;
    use tempfile::TempDir;

    fn config(extra: &str) -> AppConfig {
        AppConfig::from_yaml(&format!(
            "midi:\n  input_port: \"in\"\n  output_port: \"out\"\n{}",
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_update_lists_only_changed_preferences() {
        let old = config("preferences:\n  send_bank_msb: false\n  program_change_channel: 3\n");
        let new = config("preferences:\n  send_bank_msb: true\n  program_change_channel: 3\n");

        let update = PreferenceUpdate::between(&old, &new);
        assert_eq!(update.changed.len(), 1);
        assert_eq!(update.changed["send_bank_msb"], PreferenceValue::Bool(true));
        assert!(update.restart_required.is_empty());
    }

    #[test]
    fn test_update_flags_sections_needing_restart() {
        let old = config("");
        let new = config("surface:\n  channel: 2\ntiming:\n  long_press_ms: 800\n");

        let update = PreferenceUpdate::between(&old, &new);
        assert!(update.changed.is_empty());
        assert_eq!(update.restart_required, vec!["surface", "timing"]);
        assert!(PreferenceUpdate::between(&old, &old).is_empty());
    }

    #[tokio::test]
    async fn test_burst_of_writes_yields_one_update() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");
        let base = "midi:\n  input_port: \"in\"\n  output_port: \"out\"\n";
        fs::write(&config_path, format!("{}preferences:\n  send_bank_msb: false\n", base))?;

        let (mut watcher, initial) = PreferenceWatcher::new(
            config_path.to_string_lossy().to_string(),
            Duration::from_millis(150),
        )
        .await?;
        assert_eq!(initial.preferences["send_bank_msb"], PreferenceValue::Bool(false));

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, format!("{}preferences:\n  send_bank_msb: true\n", base))?;
        fs::write(
            &config_path,
            format!("{}preferences:\n  send_bank_msb: true\n  program_change_channel: 4\n", base),
        )?;

        let update = tokio::time::timeout(Duration::from_secs(2), watcher.next_update()).await?;
        if let Some(update) = update {
            assert_eq!(update.changed["send_bank_msb"], PreferenceValue::Bool(true));
            assert_eq!(update.changed["program_change_channel"], PreferenceValue::Number(4.0));
        }

        Ok(())
    }
}
