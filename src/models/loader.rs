//! Versioned on-disk artifact store
//!
//! Layout under the store root:
//!
//! ```text
//! ACTIVE                      id of the active bundle
//! bundles/<id>/model.json     serialized classifier
//! bundles/<id>/scaler.json    fitted scaler
//! bundles/<id>/features.json  ordered feature names
//! bundles/<id>/manifest.json  format version, metadata, crc32 per object
//! ```
//!
//! A bundle is staged under a hidden name, fsynced and renamed into place before
//! `ACTIVE` is atomically replaced, so readers observe either the previous or the
//! new bundle in full. Writers serialize on an exclusive lock file under the root,
//! which also covers other processes sharing the directory.

use crate::config::ArtifactsConfig;
use crate::error::{PipelineError, Result};
use crate::feature_extractor::FeatureSchema;
use crate::models::artifact::{ArtifactMetadata, TrainedModelArtifact};
use crate::models::classifier::{CandidateModel, ModelType};
use crate::models::scaler::StandardScaler;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Current bundle format
pub const FORMAT_VERSION: u32 = 1;

const ACTIVE_POINTER: &str = "ACTIVE";
const BUNDLES_DIR: &str = "bundles";
const STAGING_PREFIX: &str = ".staging-";
const WRITE_LOCK: &str = ".write.lock";
const TRAINING_LOCK: &str = ".training.lock";
const LOAD_ATTEMPTS: usize = 5;
const MODEL_FILE: &str = "model.json";
const SCALER_FILE: &str = "scaler.json";
const FEATURES_FILE: &str = "features.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Bundle descriptor written last into every bundle directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub bundle_id: Uuid,
    pub model_type: ModelType,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    /// Object file name -> `crc32:xxxxxxxx`
    pub checksums: BTreeMap<String, String>,
}

impl BundleManifest {
    fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            bundle_id: self.bundle_id,
            model_type: self.model_type,
            model_version: self.model_version.clone(),
            trained_at: self.trained_at,
        }
    }
}

fn format_checksum(data: &[u8]) -> String {
    format!("crc32:{:08x}", crc32fast::hash(data))
}

fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn sync_dir(path: &Path) {
    // Directory fsync is unsupported on some platforms; the rename is still atomic.
    if let Err(e) = File::open(path).and_then(|dir| dir.sync_all()) {
        debug!(path = %path.display(), error = %e, "Directory fsync skipped");
    }
}

fn discard_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != IoErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

/// Exclusive hold on one of the store's lock files, released on drop
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

/// Persists and loads trained model artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    retain_versions: usize,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. At least two bundles are always retained
    /// so a reader holding the previous pointer can still finish its load.
    pub fn new<P: AsRef<Path>>(root: P, retain_versions: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            retain_versions: retain_versions.max(2),
        }
    }

    pub fn from_config(config: &ArtifactsConfig) -> Self {
        Self::new(&config.dir, config.retain_versions)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    fn bundle_dir(&self, id: Uuid) -> PathBuf {
        self.bundles_dir().join(id.to_string())
    }

    fn open_lock_file(&self, name: &str) -> Result<File> {
        fs::create_dir_all(&self.root)?;
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(name))?;
        Ok(file)
    }

    /// Claim the store for a training run without waiting.
    ///
    /// Fails with `TrainingInProgress` while another holder, in this process or
    /// any other, has it.
    pub fn try_lock_training(&self) -> Result<StoreLock> {
        let file = self.open_lock_file(TRAINING_LOCK)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(StoreLock { _file: file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(PipelineError::TrainingInProgress)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lock_writes(&self) -> Result<StoreLock> {
        let file = self.open_lock_file(WRITE_LOCK)?;
        file.lock_exclusive()?;
        Ok(StoreLock { _file: file })
    }

    /// Persist an artifact and make it the active one.
    pub fn save(&self, artifact: &TrainedModelArtifact) -> Result<()> {
        let _lock = self.lock_writes()?;

        let metadata = artifact.metadata();
        let id = metadata.bundle_id;
        let bundles = self.bundles_dir();
        fs::create_dir_all(&bundles)?;

        let staging = bundles.join(format!("{}{}", STAGING_PREFIX, id));
        let published = self
            .write_bundle(artifact, &staging)
            .and_then(|()| self.publish(id, &staging));
        if published.is_err() {
            discard_dir(&staging);
        }
        published?;

        info!(
            bundle_id = %id,
            model_type = %metadata.model_type,
            path = %self.bundle_dir(id).display(),
            "Model artifact saved"
        );

        self.prune(id);
        Ok(())
    }

    fn write_bundle(&self, artifact: &TrainedModelArtifact, staging: &Path) -> Result<()> {
        if staging.exists() {
            fs::remove_dir_all(staging)?;
        }
        fs::create_dir_all(staging)?;

        let objects = [
            (MODEL_FILE, serde_json::to_vec(artifact.model())?),
            (SCALER_FILE, serde_json::to_vec(artifact.scaler())?),
            (FEATURES_FILE, serde_json::to_vec_pretty(artifact.schema())?),
        ];

        let mut checksums = BTreeMap::new();
        for (name, bytes) in &objects {
            write_synced(&staging.join(name), bytes)?;
            checksums.insert(name.to_string(), format_checksum(bytes));
        }

        let metadata = artifact.metadata();
        let manifest = BundleManifest {
            format_version: FORMAT_VERSION,
            bundle_id: metadata.bundle_id,
            model_type: metadata.model_type,
            model_version: metadata.model_version.clone(),
            trained_at: metadata.trained_at,
            checksums,
        };
        write_synced(
            &staging.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;
        sync_dir(staging);
        Ok(())
    }

    /// Move a staged bundle into place and point `ACTIVE` at it
    fn publish(&self, id: Uuid, staging: &Path) -> Result<()> {
        let bundles = self.bundles_dir();
        let target = self.bundle_dir(id);
        if target.exists() {
            // Bundles are immutable; an existing directory already holds this artifact.
            debug!(bundle_id = %id, "Bundle already present, reusing it");
            fs::remove_dir_all(staging)?;
        } else {
            fs::rename(staging, &target)?;
            sync_dir(&bundles);
        }

        let pointer_tmp = self.root.join(format!("{}.{}.tmp", ACTIVE_POINTER, id));
        let swapped = write_synced(&pointer_tmp, id.to_string().as_bytes())
            .and_then(|()| {
                fs::rename(&pointer_tmp, self.root.join(ACTIVE_POINTER)).map_err(PipelineError::from)
            });
        if swapped.is_err() {
            let _ = fs::remove_file(&pointer_tmp);
        }
        swapped?;
        sync_dir(&self.root);
        Ok(())
    }

    /// Load the active artifact, or `None` when it is absent or unusable.
    pub fn load(&self) -> Option<TrainedModelArtifact> {
        match self.try_load() {
            Ok(artifact) => {
                info!(
                    bundle_id = %artifact.metadata().bundle_id,
                    model_type = %artifact.metadata().model_type,
                    "Model loaded successfully"
                );
                Some(artifact)
            }
            Err(PipelineError::ModelNotTrained) => {
                info!(root = %self.root.display(), "No trained model available");
                None
            }
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Could not load existing model");
                None
            }
        }
    }

    /// Load the active artifact, reporting why it is unavailable.
    ///
    /// A bundle pruned between reading `ACTIVE` and reading its objects is
    /// retried against the new pointer.
    pub fn try_load(&self) -> Result<TrainedModelArtifact> {
        let mut id = self.active_bundle_id()?.ok_or(PipelineError::ModelNotTrained)?;
        let mut attempt = 1;
        loop {
            match self.load_bundle(id) {
                Err(PipelineError::ArtifactCorrupt(reason)) if attempt < LOAD_ATTEMPTS => {
                    match self.active_bundle_id()? {
                        Some(current) if current != id => {
                            debug!(stale = %id, active = %current, "Active bundle moved during load, retrying");
                            id = current;
                            attempt += 1;
                        }
                        _ => return Err(PipelineError::ArtifactCorrupt(reason)),
                    }
                }
                loaded => return loaded,
            }
        }
    }

    /// Id named by the active pointer, if any
    pub fn active_bundle_id(&self) -> Result<Option<Uuid>> {
        match fs::read_to_string(self.root.join(ACTIVE_POINTER)) {
            Ok(contents) => Uuid::parse_str(contents.trim())
                .map(Some)
                .map_err(|e| PipelineError::ArtifactCorrupt(format!("active pointer: {}", e))),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a specific bundle by id
    pub fn load_bundle(&self, id: Uuid) -> Result<TrainedModelArtifact> {
        let dir = self.bundle_dir(id);
        let manifest: BundleManifest = serde_json::from_slice(&read_object(&dir, MANIFEST_FILE)?)
            .map_err(|e| PipelineError::ArtifactCorrupt(format!("{}: {}", MANIFEST_FILE, e)))?;

        if manifest.bundle_id != id {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "bundle {} carries manifest for {}",
                id, manifest.bundle_id
            )));
        }

        match manifest.format_version {
            1 => decode_v1(&dir, &manifest),
            other => Err(PipelineError::ArtifactCorrupt(format!(
                "unsupported bundle format version {} (supported: {})",
                other, FORMAT_VERSION
            ))),
        }
    }

    /// Remove the oldest bundles beyond the retention limit, and staging leftovers
    /// of interrupted saves. Runs under the write lock and never removes `saved`
    /// or the bundle `ACTIVE` currently names.
    fn prune(&self, saved: Uuid) {
        let entries = match fs::read_dir(self.bundles_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not list bundles for pruning");
                return;
            }
        };
        let active = self.active_bundle_id().ok().flatten();

        let mut bundles: Vec<(DateTime<Utc>, Uuid)> = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(STAGING_PREFIX) {
                debug!(path = %entry.path().display(), "Removing abandoned staging directory");
                discard_dir(&entry.path());
                continue;
            }
            let Ok(id) = Uuid::parse_str(&name) else {
                continue;
            };
            let trained_at = read_object(&self.bundle_dir(id), MANIFEST_FILE)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<BundleManifest>(&bytes).ok())
                .map(|m| m.trained_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            bundles.push((trained_at, id));
        }

        bundles.sort_by(|a, b| b.cmp(a));
        for (_, id) in bundles.into_iter().skip(self.retain_versions) {
            if id == saved || Some(id) == active {
                continue;
            }
            match fs::remove_dir_all(self.bundle_dir(id)) {
                Ok(()) => debug!(bundle_id = %id, "Pruned old model bundle"),
                Err(e) => warn!(bundle_id = %id, error = %e, "Failed to prune model bundle"),
            }
        }
    }
}

fn read_object(dir: &Path, name: &str) -> Result<Vec<u8>> {
    fs::read(dir.join(name)).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            PipelineError::ArtifactCorrupt(format!("bundle {} is missing {}", dir.display(), name))
        } else {
            PipelineError::Io(e)
        }
    })
}

fn read_verified<T: DeserializeOwned>(dir: &Path, name: &str, manifest: &BundleManifest) -> Result<T> {
    let bytes = read_object(dir, name)?;
    let expected = manifest
        .checksums
        .get(name)
        .ok_or_else(|| PipelineError::ArtifactCorrupt(format!("manifest has no checksum for {}", name)))?;

    let actual = format_checksum(&bytes);
    if &actual != expected {
        return Err(PipelineError::ArtifactCorrupt(format!(
            "{} checksum mismatch: expected {}, found {}",
            name, expected, actual
        )));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::ArtifactCorrupt(format!("{}: {}", name, e)))
}

fn decode_v1(dir: &Path, manifest: &BundleManifest) -> Result<TrainedModelArtifact> {
    let model: CandidateModel = read_verified(dir, MODEL_FILE, manifest)?;
    let scaler: StandardScaler = read_verified(dir, SCALER_FILE, manifest)?;
    let schema: FeatureSchema = read_verified(dir, FEATURES_FILE, manifest)?;

    TrainedModelArtifact::new(model, scaler, schema, manifest.metadata())
        .map_err(|e| PipelineError::ArtifactCorrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use ndarray::array;
    use tempfile::TempDir;

    use crate::feature_extractor::FeatureVector;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn artifact_of(model_type: ModelType) -> TrainedModelArtifact {
        let x = array![[0.0, 1.0], [0.2, 1.5], [1.0, 0.0], [1.3, 0.2], [3.0, 5.0], [3.2, 4.0]];
        let y = [0, 0, 1, 1, 2, 2];
        let scaler = StandardScaler::fit(&x).unwrap();
        let model = model_type
            .fit(&scaler.transform(&x).unwrap(), &y, &TrainingConfig::default())
            .unwrap();
        let schema = FeatureSchema::new(vec!["a".to_string(), "b".to_string()]);
        TrainedModelArtifact::new(model, scaler, schema, TrainedModelArtifact::fresh_metadata(model_type))
            .unwrap()
    }

    fn artifact() -> TrainedModelArtifact {
        artifact_of(ModelType::LogisticRegression)
    }

    fn fresh_copy(artifact: &TrainedModelArtifact) -> TrainedModelArtifact {
        TrainedModelArtifact::new(
            artifact.model().clone(),
            artifact.scaler().clone(),
            artifact.schema().clone(),
            TrainedModelArtifact::fresh_metadata(artifact.metadata().model_type),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_store_is_untrained() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);

        assert!(store.load().is_none());
        assert!(matches!(store.try_load(), Err(PipelineError::ModelNotTrained)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let original = artifact();

        store.save(&original).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, original);
        assert_eq!(store.active_bundle_id().unwrap(), Some(original.metadata().bundle_id));
    }

    #[test]
    fn test_every_model_family_reloads_identically() {
        let schema = FeatureSchema::new(vec!["a".to_string(), "b".to_string()]);
        let inputs = [[0.1, 1.2], [1.1, 0.1], [3.1, 4.5], [2.0, 2.0], [-1.0, 9.0]];

        for model_type in ModelType::ALL {
            let dir = TempDir::new().unwrap();
            let store = ArtifactStore::new(dir.path(), 3);
            let original = artifact_of(model_type);

            store.save(&original).unwrap();
            let loaded = store.try_load().unwrap();
            assert_eq!(loaded, original, "{} changed on reload", model_type);

            for input in inputs {
                let features = FeatureVector::new(schema.clone(), input.to_vec()).unwrap();
                assert_eq!(
                    loaded.predict_proba(&features).unwrap(),
                    original.predict_proba(&features).unwrap(),
                    "{} scores differ on reload",
                    model_type
                );
            }
        }
    }

    #[test]
    fn test_save_replaces_active_bundle() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let first = artifact();
        let second = artifact();

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap().metadata().bundle_id, second.metadata().bundle_id);
        // superseded bundle is kept, not mutated
        assert_eq!(
            store.load_bundle(first.metadata().bundle_id).unwrap(),
            first
        );
    }

    #[test]
    fn test_missing_object_treated_as_no_model() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let original = artifact();
        store.save(&original).unwrap();

        fs::remove_file(store.bundle_dir(original.metadata().bundle_id).join(SCALER_FILE)).unwrap();

        assert!(store.load().is_none());
        assert!(matches!(store.try_load(), Err(PipelineError::ArtifactCorrupt(_))));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let original = artifact();
        store.save(&original).unwrap();

        let features = store.bundle_dir(original.metadata().bundle_id).join(FEATURES_FILE);
        fs::write(&features, b"[\"a\", \"c\"]").unwrap();

        let err = store.try_load().unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_unknown_format_version_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let original = artifact();
        store.save(&original).unwrap();

        let path = store.bundle_dir(original.metadata().bundle_id).join(MANIFEST_FILE);
        let mut manifest: BundleManifest =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        manifest.format_version = 99;
        fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let err = store.try_load().unwrap_err();
        assert!(err.to_string().contains("unsupported bundle format version 99"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_pointer() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(ACTIVE_POINTER), "not-a-uuid").unwrap();
        let store = ArtifactStore::new(dir.path(), 3);

        assert!(matches!(store.try_load(), Err(PipelineError::ArtifactCorrupt(_))));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_prune_keeps_newest_bundles() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 2);
        let saved: Vec<TrainedModelArtifact> = (0..4)
            .map(|_| {
                let a = artifact();
                store.save(&a).unwrap();
                a
            })
            .collect();

        let remaining = fs::read_dir(store.bundles_dir()).unwrap().count();
        assert_eq!(remaining, 2);
        assert_eq!(
            store.load().unwrap().metadata().bundle_id,
            saved[3].metadata().bundle_id
        );
        assert!(store.load_bundle(saved[0].metadata().bundle_id).is_err());
    }

    #[test]
    fn test_failed_pointer_swap_leaves_no_temporaries() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        // a directory where the pointer belongs makes the final rename fail
        fs::create_dir_all(dir.path().join(ACTIVE_POINTER).join("occupied")).unwrap();

        assert!(store.save(&artifact()).is_err());

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .chain(fs::read_dir(store.bundles_dir()).unwrap())
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp") || name.starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "left behind {:?}", leftovers);
    }

    #[test]
    fn test_abandoned_staging_removed_on_next_save() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let abandoned = store.bundles_dir().join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        fs::create_dir_all(&abandoned).unwrap();
        fs::write(abandoned.join(MODEL_FILE), b"{").unwrap();

        store.save(&artifact()).unwrap();

        assert!(!abandoned.exists());
        assert!(store.load().is_some());
    }

    #[test]
    fn test_training_lock_is_exclusive_per_store() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 3);
        let other_handle = ArtifactStore::new(dir.path(), 3);

        let held = store.try_lock_training().unwrap();
        assert!(matches!(
            other_handle.try_lock_training(),
            Err(PipelineError::TrainingInProgress)
        ));

        drop(held);
        assert!(other_handle.try_lock_training().is_ok());
    }

    #[test]
    fn test_concurrent_writers_keep_active_bundle_loadable() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path(), 2);
        let template = artifact();
        store.save(&template).unwrap();
        let writing = AtomicBool::new(true);

        std::thread::scope(|scope| {
            let (shared, writing, template) = (&store, &writing, &template);
            let readers: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(move || {
                        while writing.load(Ordering::Acquire) {
                            if let Err(e) = shared.try_load() {
                                panic!("reader saw a partial store: {}", e);
                            }
                        }
                    })
                })
                .collect();

            let writers: Vec<_> = (0..2)
                .map(|_| {
                    // each writer has its own handle on the directory
                    let store = shared.clone();
                    scope.spawn(move || {
                        for _ in 0..40 {
                            store.save(&fresh_copy(template)).unwrap();
                        }
                    })
                })
                .collect();

            for writer in writers {
                writer.join().unwrap();
            }
            writing.store(false, Ordering::Release);
            for reader in readers {
                reader.join().unwrap();
            }
        });

        let active = store.active_bundle_id().unwrap().unwrap();
        assert_eq!(store.load().unwrap().metadata().bundle_id, active);
        // two newest by training time, plus the active one when it is older
        let names: Vec<String> = fs::read_dir(store.bundles_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!((2..=3).contains(&names.len()), "unexpected bundles {:?}", names);
        assert!(names.contains(&active.to_string()));
    }
}
