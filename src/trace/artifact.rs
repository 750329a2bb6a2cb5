//! File-backed trace artifact.
//!
//! An artifact is a directory holding one output file per monitor plus a
//! `manifest.json` that lists them. Entry contents are read lazily and cached;
//! nothing is deleted implicitly, so whoever stops the capture owns cleanup.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{FlickerError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Outcome tag applied to an artifact after assertions ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    AssertionSuccess,
    AssertionFailed,
    ExecutionError,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssertionSuccess => "ASSERTION_SUCCESS",
            Self::AssertionFailed => "ASSERTION_FAILED",
            Self::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub scenario: String,
    pub created: String,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
}

#[derive(Debug)]
pub struct TraceArtifact {
    dir: PathBuf,
    manifest: Manifest,
    cache: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl TraceArtifact {
    /// Create an empty artifact directory. An existing directory is reused.
    pub fn create(dir: impl Into<PathBuf>, scenario: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| FlickerError::io(&dir, e))?;
        let artifact = Self {
            dir,
            manifest: Manifest {
                scenario: scenario.into(),
                created: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                entries: Vec::new(),
                run_status: None,
            },
            cache: Mutex::new(HashMap::new()),
        };
        artifact.write_manifest()?;
        Ok(artifact)
    }

    /// Open an existing artifact from its manifest.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw =
            fs::read_to_string(&manifest_path).map_err(|e| FlickerError::io(&manifest_path, e))?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        Ok(Self {
            dir,
            manifest,
            cache: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.manifest.entries
    }

    /// Where a new entry file should be written.
    #[must_use]
    pub fn file_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Record a file already placed inside the artifact directory.
    pub fn add_entry(&mut self, name: impl Into<String>, file: impl Into<String>) -> Result<()> {
        let name = name.into();
        let file = file.into();
        let path = self.file_path(&file);
        if !path.is_file() {
            return Err(FlickerError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact entry missing"),
            ));
        }
        self.manifest.entries.retain(|e| e.name != name);
        self.manifest.entries.push(ManifestEntry { name, file });
        self.write_manifest()
    }

    #[must_use]
    pub fn entry_path(&self, name: &str) -> Option<PathBuf> {
        self.manifest
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| self.file_path(&e.file))
    }

    /// Contents of a named entry, loaded on first access.
    pub fn read_entry(&self, name: &str) -> Result<Arc<[u8]>> {
        let file = self
            .manifest
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.file.clone())
            .ok_or_else(|| FlickerError::TraceParse {
                path: self.dir.clone(),
                details: format!("artifact has no entry named {name:?}"),
            })?;
        self.read_file(&file)
    }

    /// Contents of any file inside the artifact directory, cached.
    pub fn read_file(&self, file: &str) -> Result<Arc<[u8]>> {
        let mut cache = self.cache.lock();
        if let Some(bytes) = cache.get(file) {
            return Ok(Arc::clone(bytes));
        }
        let path = self.file_path(file);
        let bytes: Arc<[u8]> = fs::read(&path)
            .map_err(|e| FlickerError::io(&path, e))?
            .into();
        cache.insert(file.to_string(), Arc::clone(&bytes));
        Ok(bytes)
    }

    #[must_use]
    pub fn run_status(&self) -> Option<RunStatus> {
        self.manifest.run_status
    }

    /// Rename the directory to `<STATUS>__<name>` and record the status.
    /// Re-tagging replaces the previous prefix.
    pub fn tag_run_status(&mut self, status: RunStatus) -> Result<()> {
        let base = self.base_name();
        let tagged = format!("{}__{base}", status.as_str());
        let target = self
            .dir
            .parent()
            .map_or_else(|| PathBuf::from(&tagged), |p| p.join(&tagged));
        if target != self.dir {
            fs::rename(&self.dir, &target).map_err(|e| FlickerError::io(&self.dir, e))?;
            self.dir = target;
        }
        self.manifest.run_status = Some(status);
        self.write_manifest()
    }

    /// Remove the artifact directory and everything in it.
    pub fn delete(self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlickerError::io(&self.dir, e)),
        }
    }

    fn base_name(&self) -> String {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.split_once("__") {
            Some((prefix, rest)) if is_status_prefix(prefix) => rest.to_string(),
            _ => name,
        }
    }

    fn write_manifest(&self) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(&path, json).map_err(|e| FlickerError::io(&path, e))
    }
}

fn is_status_prefix(prefix: &str) -> bool {
    [
        RunStatus::AssertionSuccess,
        RunStatus::AssertionFailed,
        RunStatus::ExecutionError,
    ]
    .iter()
    .any(|s| s.as_str() == prefix)
}

/// Whether `dir` looks like a trace artifact.
#[must_use]
pub fn is_artifact_dir(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_add_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uiTrace_Foo_bar-1");
        let mut artifact = TraceArtifact::create(&root, "Foo#bar").unwrap();
        fs::write(artifact.file_path("layers.perfetto-trace"), b"abc").unwrap();
        artifact
            .add_entry("layers", "layers.perfetto-trace")
            .unwrap();

        let reopened = TraceArtifact::open(&root).unwrap();
        assert_eq!(reopened.manifest().scenario, "Foo#bar");
        assert_eq!(reopened.entries().len(), 1);
        assert_eq!(&*reopened.read_entry("layers").unwrap(), b"abc");
    }

    #[test]
    fn missing_entry_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TraceArtifact::create(dir.path().join("a"), "s").unwrap();
        assert!(artifact.add_entry("layers", "nope").is_err());
        assert!(artifact.read_entry("layers").is_err());
    }

    #[test]
    fn read_is_cached_after_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TraceArtifact::create(dir.path().join("a"), "s").unwrap();
        let path = artifact.file_path("wm.perfetto-trace");
        fs::write(&path, b"first").unwrap();
        artifact.add_entry("wm", "wm.perfetto-trace").unwrap();

        assert_eq!(&*artifact.read_entry("wm").unwrap(), b"first");
        fs::write(&path, b"second").unwrap();
        assert_eq!(&*artifact.read_entry("wm").unwrap(), b"first");
    }

    #[test]
    fn tag_run_status_renames_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TraceArtifact::create(dir.path().join("uiTrace_run-1"), "run").unwrap();
        artifact.tag_run_status(RunStatus::AssertionFailed).unwrap();
        assert_eq!(
            artifact.path(),
            dir.path().join("ASSERTION_FAILED__uiTrace_run-1")
        );
        artifact.tag_run_status(RunStatus::AssertionSuccess).unwrap();
        assert_eq!(
            artifact.path(),
            dir.path().join("ASSERTION_SUCCESS__uiTrace_run-1")
        );
        let reopened = TraceArtifact::open(artifact.path()).unwrap();
        assert_eq!(reopened.run_status(), Some(RunStatus::AssertionSuccess));
    }

    #[test]
    fn delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a");
        let artifact = TraceArtifact::create(&root, "s").unwrap();
        assert!(is_artifact_dir(&root));
        artifact.delete().unwrap();
        assert!(!root.exists());
    }
}
