//! The rule store (C5): holds the current [`RuleSet`] behind an `ArcSwap`,
//! loads it lazily, reloads it on demand or on a background mtime-polling
//! schedule, and persists edits back to the YAML document (or, best
//! effort, to a cluster configmap).

use crate::error::RelayError;
use crate::rules::{self, RuleSet};
use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct RuleStore {
    path: PathBuf,
    configmap_name: Option<String>,
    rules: ArcSwap<RuleSet>,
    last_mtime: AtomicI64,
    loaded: std::sync::atomic::AtomicBool,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>, configmap_name: Option<String>) -> Self {
        Self {
            path: path.into(),
            configmap_name,
            rules: ArcSwap::from_pointee(RuleSet::default()),
            last_mtime: AtomicI64::new(i64::MIN),
            loaded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Return the current rules, lazily loading from disk on first access.
    pub fn get_rules(&self) -> Arc<RuleSet> {
        if !self.loaded.load(Ordering::Acquire) {
            let _ = self.reload_rules();
        }
        self.rules.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Re-parse the persisted document and atomically swap it in.
    pub fn reload_rules(&self) -> Result<Arc<RuleSet>, RelayError> {
        let parsed = load_from_path(&self.path)?;
        let errors = rules::validate(&parsed);
        if !errors.is_empty() {
            return Err(RelayError::Validation(format!(
                "rule document failed validation: {}",
                errors.join("; ")
            )));
        }
        let parsed = Arc::new(parsed);
        self.rules.store(parsed.clone());
        self.loaded.store(true, Ordering::Release);
        if let Ok(meta) = std::fs::metadata(&self.path)
            && let Ok(mtime) = meta.modified()
            && let Ok(secs) = mtime.duration_since(std::time::UNIX_EPOCH)
        {
            self.last_mtime.store(secs.as_secs() as i64, Ordering::Release);
        }
        Ok(parsed)
    }

    /// Replace the in-memory rules without persisting.
    pub fn set_rules(&self, rules: RuleSet) {
        self.rules.store(Arc::new(rules));
        self.loaded.store(true, Ordering::Release);
    }

    /// Serialize `rules` and write it to the persisted document. When
    /// `CONFIGMAP_NAME` is configured, this first attempts (as a best
    /// effort) a cluster-configmap patch; no cluster client is linked into
    /// this implementation, so that path always logs a warning and falls
    /// through to the local file.
    pub fn persist_rules(&self, rules: &RuleSet) -> Result<(), RelayError> {
        if let Some(name) = &self.configmap_name {
            tracing::warn!(
                configmap = %name,
                "cluster-configmap persistence requested but no cluster client is linked in; falling back to local file"
            );
        }

        let yaml = serde_yaml_ng::to_string(rules)
            .map_err(|e| RelayError::Internal(format!("failed to serialize rules: {e}")))?;

        match std::fs::write(&self.path, yaml) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(
                RelayError::Persistence(format!("rules path {:?} is read-only: {e}", self.path)),
            ),
            Err(e) => Err(RelayError::Persistence(format!(
                "failed to write rules path {:?}: {e}",
                self.path
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_from_path(path: &Path) -> Result<RuleSet, RelayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RelayError::Internal(format!("failed to read rules path {path:?}: {e}"))
    })?;
    let rules: RuleSet = serde_yaml_ng::from_str(&contents)?;
    Ok(rules)
}

/// Spawn the auto-reload background task (§4.5): wake every
/// `watch_interval` seconds, compare the persisted document's mtime
/// against the last observed value, and reload on a strictly newer mtime.
/// `watch_interval == 0` disables the task entirely. The first observation
/// only establishes a baseline; it never triggers a reload.
pub fn spawn_auto_reload(
    store: Arc<RuleStore>,
    watch_interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if watch_interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut baseline_established = false;
        loop {
            tokio::time::sleep(watch_interval).await;

            let mtime = match std::fs::metadata(store.path()).and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, path = ?store.path(), "auto-reload: failed to stat rules path");
                    continue;
                }
            };
            let secs = match mtime.duration_since(std::time::UNIX_EPOCH) {
                Ok(d) => d.as_secs() as i64,
                Err(_) => continue,
            };

            let previous = store.last_mtime.load(Ordering::Acquire);
            if !baseline_established {
                store.last_mtime.store(secs, Ordering::Release);
                baseline_established = true;
                continue;
            }

            if secs > previous {
                match store.reload_rules() {
                    Ok(_) => tracing::info!("rules auto-reloaded from {:?}", store.path()),
                    Err(e) => tracing::error!(error = %e, "rules auto-reload failed"),
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rules(dir: &tempfile::TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("rules.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        path
    }

    const MINIMAL: &str = r#"
version: 1
defaults:
  target-timeout-connect-sec: 5
  target-timeout-read-sec: 10
routes:
  - name: ocp
    match:
      source: ocp
    target:
      url: "https://example.com/hook"
"#;

    #[test]
    fn lazy_load_on_first_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(&dir, MINIMAL);
        let store = RuleStore::new(path, None);
        assert!(!store.is_loaded());
        let rules = store.get_rules();
        assert!(store.is_loaded());
        assert_eq!(rules.routes.len(), 1);
    }

    #[test]
    fn reload_picks_up_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(&dir, MINIMAL);
        let store = RuleStore::new(path.clone(), None);
        store.get_rules();

        let updated = MINIMAL.replace("ocp", "kafka");
        std::fs::write(&path, updated).unwrap();
        let reloaded = store.reload_rules().unwrap();
        assert_eq!(reloaded.routes[0].name, "kafka");
    }

    #[test]
    fn reload_rejects_invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let duplicate = MINIMAL.to_string() + "\n  - name: ocp\n    match:\n      source: ocp\n    target:\n      url: \"https://x\"\n";
        let path = write_rules(&dir, &duplicate);
        let store = RuleStore::new(path, None);
        assert!(store.reload_rules().is_err());
    }

    #[test]
    fn set_rules_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(&dir, MINIMAL);
        let store = RuleStore::new(path.clone(), None);
        let mut rules = (*store.get_rules()).clone();
        rules.version = 2;
        store.set_rules(rules);
        assert_eq!(store.get_rules().version, 2);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("version: 1"));
    }

    #[test]
    fn persist_writes_yaml_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(&dir, MINIMAL);
        let store = RuleStore::new(path.clone(), None);
        let mut rules = (*store.get_rules()).clone();
        rules.version = 7;
        store.persist_rules(&rules).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("version: 7"));
    }
}
