//! Artifact store: the only way stages touch the filesystem.
//!
//! Paths in the configuration are relative to the store root (the working
//! directory of the run); absolute paths are used as given. Every write goes
//! to a temporary file in the destination directory and is then renamed over
//! the target, so a reader never observes a half-written artifact.
//!
//! Model artifacts are two files in the model directory:
//!
//! - `<family>.model`: the fitted state as JSON
//! - `<family>.meta.json`: a [`ModelMetadata`] sidecar, written last
//!
//! A family is only listed once its sidecar exists.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Extension of a model state blob.
pub const MODEL_EXTENSION: &str = "model";

/// Suffix of a model metadata sidecar.
pub const METADATA_SUFFIX: &str = ".meta.json";

/// Descriptive metadata persisted next to every fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Registry name of the model family
    pub family: String,
    /// Resolved hyperparameters the model was fitted with
    pub hyperparameters: Value,
    /// Feature columns, in the order the model expects them
    pub feature_names: Vec<String>,
    /// Column the model predicts
    pub target_column: String,
    /// Number of training rows
    pub training_rows: usize,
    /// RFC 3339 timestamp of the fit
    pub trained_at: String,
}

/// A fitted model with its metadata. `M` is the family's serialized state.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact<M = Value> {
    pub metadata: ModelMetadata,
    pub state: M,
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a configured path against the store root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).exists()
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Read a CSV table with a header row. Column types are inferred from the
    /// whole file.
    pub fn read_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let full = self.require_file(path.as_ref())?;
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .try_into_reader_with_file_path(Some(full.clone()))
            .and_then(|reader| reader.finish())
            .map_err(|e| PipelineError::ArtifactCorrupt {
                path: full.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            full.display()
        );
        Ok(df)
    }

    /// Atomically write a table as CSV with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>, df: &DataFrame) -> Result<PathBuf> {
        let mut df = df.clone();
        let full = self.resolve(path);
        self.publish(&full, |file| {
            CsvWriter::new(file)
                .include_header(true)
                .with_separator(b',')
                .finish(&mut df)?;
            Ok(())
        })?;
        debug!("Saved {} rows to {}", df.height(), full.display());
        Ok(full)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Read and decode a JSON document.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let full = self.require_file(path.as_ref())?;
        let text = std::fs::read_to_string(&full)?;
        serde_json::from_str(&text).map_err(|e| PipelineError::ArtifactCorrupt {
            path: full.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Atomically write a value as pretty-printed JSON.
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
        let text = serde_json::to_string_pretty(value)?;
        self.write_text(path, &text)
    }

    /// Atomically write a text document.
    pub fn write_text(&self, path: impl AsRef<Path>, text: &str) -> Result<PathBuf> {
        let full = self.resolve(path);
        self.publish(&full, |file| {
            file.write_all(text.as_bytes())?;
            Ok(())
        })?;
        Ok(full)
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Persist a fitted model: state blob first, metadata sidecar last.
    pub fn write_model<M: Serialize>(
        &self,
        model_dir: impl AsRef<Path>,
        artifact: &ModelArtifact<M>,
    ) -> Result<PathBuf> {
        let model_dir = model_dir.as_ref();
        let family = &artifact.metadata.family;
        let blob = self.write_json(model_blob_path(model_dir, family), &artifact.state)?;
        self.write_json(model_metadata_path(model_dir, family), &artifact.metadata)?;
        Ok(blob)
    }

    /// Load a persisted model, leaving its state undecoded.
    pub fn read_model(&self, model_dir: impl AsRef<Path>, family: &str) -> Result<ModelArtifact> {
        let model_dir = model_dir.as_ref();
        let sidecar = model_metadata_path(model_dir, family);
        let blob = model_blob_path(model_dir, family);
        match (self.exists(&sidecar), self.exists(&blob)) {
            (true, true) => {}
            (false, false) => {
                return Err(PipelineError::ArtifactNotFound {
                    path: self.resolve(&blob).display().to_string(),
                });
            }
            (has_sidecar, _) => {
                let missing = if has_sidecar { &blob } else { &sidecar };
                return Err(PipelineError::ArtifactCorrupt {
                    path: self.resolve(&blob).display().to_string(),
                    reason: format!("{} is missing", self.resolve(missing).display()),
                });
            }
        }

        let metadata: ModelMetadata = self.read_json(&sidecar)?;
        if metadata.family != family {
            return Err(PipelineError::ArtifactCorrupt {
                path: self.resolve(&sidecar).display().to_string(),
                reason: format!("metadata names family '{}'", metadata.family),
            });
        }
        let state: Value = self.read_json(&blob)?;
        Ok(ModelArtifact { metadata, state })
    }

    /// Delete a family's model: sidecar first, so a half-removed model is no
    /// longer listed, then the blob. Absent files are not an error.
    pub fn remove_model(&self, model_dir: impl AsRef<Path>, family: &str) -> Result<()> {
        let model_dir = model_dir.as_ref();
        for path in [
            model_metadata_path(model_dir, family),
            model_blob_path(model_dir, family),
        ] {
            match std::fs::remove_file(self.resolve(&path)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(family, "model removed");
        Ok(())
    }

    /// Families with a persisted model, sorted by name.
    ///
    /// A missing directory lists nothing.
    pub fn list_models(&self, model_dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = self.resolve(model_dir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut families = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(family) = name.strip_suffix(METADATA_SUFFIX)
                && !family.is_empty()
            {
                families.push(family.to_string());
            }
        }
        families.sort();
        Ok(families)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_file(&self, path: &Path) -> Result<PathBuf> {
        let full = self.resolve(path);
        if full.is_file() {
            Ok(full)
        } else {
            Err(PipelineError::ArtifactNotFound {
                path: full.display().to_string(),
            })
        }
    }

    /// Write through a temporary file in the target directory, then rename it
    /// over the target.
    fn publish(
        &self,
        target: &Path,
        write: impl FnOnce(&mut std::fs::File) -> Result<()>,
    ) -> Result<()> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.root.clone(),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        write(tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        tmp.persist(target).map_err(|e| PipelineError::Io(e.error))?;
        Ok(())
    }
}

/// Path of a family's state blob inside `model_dir`.
pub fn model_blob_path(model_dir: &Path, family: &str) -> PathBuf {
    model_dir.join(format!("{}.{}", family, MODEL_EXTENSION))
}

/// Path of a family's metadata sidecar inside `model_dir`.
pub fn model_metadata_path(model_dir: &Path, family: &str) -> PathBuf {
    model_dir.join(format!("{}{}", family, METADATA_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(family: &str) -> ModelMetadata {
        ModelMetadata {
            family: family.to_string(),
            hyperparameters: json!({"n_estimators": 10}),
            feature_names: vec!["sales".to_string(), "temperature".to_string()],
            target_column: "food_waste".to_string(),
            training_rows: 8,
            trained_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_csv_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let df = df![
            "sales" => [Some(10.5), None, Some(12.0)],
            "weather" => ["Sunny", "Rain", "Sunny"],
        ]
        .unwrap();

        let path = store.write_csv("data/processed/train.csv", &df).unwrap();
        assert!(path.is_file());

        let loaded = store.read_csv("data/processed/train.csv").unwrap();
        assert_eq!(loaded.shape(), (3, 2));
        assert_eq!(loaded.column("sales").unwrap().null_count(), 1);
    }

    #[test]
    fn test_missing_csv_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store.read_csv("data/raw/missing.csv").unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_corrupt_json_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write_text("encodings.json", "{ not json").unwrap();
        let err = store
            .read_json::<Value>("encodings.json")
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write_json("reports/metrics.json", &json!({"a": 1})).unwrap();
        store.write_json("reports/metrics.json", &json!({"a": 2})).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["metrics.json".to_string()]);
        let value: Value = store.read_json("reports/metrics.json").unwrap();
        assert_eq!(value, json!({"a": 2}));
    }

    #[test]
    fn test_model_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        for family in ["RandomForest", "LinearRegression"] {
            let artifact = ModelArtifact {
                metadata: metadata(family),
                state: json!({"weights": [1.0, 2.0]}),
            };
            store.write_model("models", &artifact).unwrap();
        }
        // a blob without its sidecar is not a published model
        store.write_text("models/Orphan.model", "{}").unwrap();

        assert_eq!(
            store.list_models("models").unwrap(),
            vec!["LinearRegression".to_string(), "RandomForest".to_string()]
        );

        let loaded = store.read_model("models", "RandomForest").unwrap();
        assert_eq!(loaded.metadata, metadata("RandomForest"));
        assert_eq!(loaded.state, json!({"weights": [1.0, 2.0]}));
    }

    #[test]
    fn test_remove_model_unpublishes_family() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = ModelArtifact {
            metadata: metadata("RandomForest"),
            state: json!({}),
        };
        store.write_model("models", &artifact).unwrap();

        store.remove_model("models", "RandomForest").unwrap();
        assert!(store.list_models("models").unwrap().is_empty());
        assert!(!store.exists("models/RandomForest.model"));
        // removing again is a no-op
        store.remove_model("models", "RandomForest").unwrap();
    }

    #[test]
    fn test_half_written_model_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write_text("models/Orphan.model", "{}").unwrap();

        let err = store.read_model("models", "Orphan").unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactCorrupt { .. }));
        let err = store.read_model("models", "Absent").unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_list_models_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.list_models("models").unwrap().is_empty());
    }

    #[test]
    fn test_absolute_paths_bypass_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new("/nonexistent-root");
        let target = dir.path().join("out.txt");
        store.write_text(&target, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello");
    }
}
