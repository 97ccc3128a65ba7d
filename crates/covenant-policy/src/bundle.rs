// crates/covenant-policy/src/bundle.rs
// ============================================================================
// Module: Rule Bundles
// Description: Immutable, content-addressed bundles with manifests.
// Purpose: Persist rule sets with verifiable digests and lifecycle state.
// Dependencies: covenant-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A bundle is an immutable archive of rule sources plus a manifest:
//! per-file digests, the framework mix, an overall content digest, the
//! constitutional tag, a creation timestamp, and a version tag. Bundles are
//! content-addressed by their manifest digest; storage rejects digest
//! mismatches on load, and loaded content round-trips byte-identically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use covenant_core::BundleId;
use covenant_core::BundleVersion;
use covenant_core::ConstitutionalTag;
use covenant_core::DEFAULT_HASH_ALGORITHM;
use covenant_core::HashDigest;
use covenant_core::Timestamp;
use covenant_core::hash_bytes;
use covenant_core::hash_canonical_json;
use covenant_core::interfaces::PolicyError;
use covenant_core::interfaces::RuleSourceFile;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Bundle State
// ============================================================================

/// Lifecycle state of a bundle.
///
/// # Invariants
/// - `Pending → Active → Retired`; `Active → Retired` is irreversible, but
///   retired bundles remain addressable for rollback (rollback re-stages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    /// Staged, not yet serving decisions.
    Pending,
    /// The single bundle serving decisions.
    Active,
    /// Previously active; queryable for rollback.
    Retired,
}

impl BundleState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Retired => "retired",
        }
    }
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// One file entry in a bundle manifest.
///
/// # Invariants
/// - `digest` is the content hash of the stored file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Source file name.
    pub name: String,
    /// Content digest of the file bytes.
    pub digest: HashDigest,
}

/// Bundle manifest: inventory, mix, digests, tag, and version.
///
/// # Invariants
/// - `content_digest` covers the ordered file inventory.
/// - Manifests are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Ordered file inventory.
    pub files: Vec<ManifestFile>,
    /// Clause counts per top-level package namespace.
    pub framework_mix: BTreeMap<String, usize>,
    /// Digest over the ordered inventory.
    pub content_digest: HashDigest,
    /// Constitutional tag.
    pub tag: ConstitutionalTag,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Version assigned at staging.
    pub version: BundleVersion,
}

impl BundleManifest {
    /// Builds a manifest over sources, computing all digests.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] when digest computation fails.
    pub fn build(
        sources: &[RuleSourceFile],
        framework_mix: BTreeMap<String, usize>,
        tag: ConstitutionalTag,
        created_at: Timestamp,
        version: BundleVersion,
    ) -> Result<Self, PolicyError> {
        let files: Vec<ManifestFile> = sources
            .iter()
            .map(|source| ManifestFile {
                name: source.name.clone(),
                digest: hash_bytes(DEFAULT_HASH_ALGORITHM, source.content.as_bytes()),
            })
            .collect();
        let content_digest = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &files)
            .map_err(|err| PolicyError::Storage(err.to_string()))?;
        Ok(Self {
            files,
            framework_mix,
            content_digest,
            tag,
            created_at,
            version,
        })
    }

    /// Returns the content-addressed bundle identifier for this manifest.
    #[must_use]
    pub fn bundle_id(&self) -> BundleId {
        BundleId::new(self.content_digest.value.clone())
    }
}

// ============================================================================
// SECTION: Bundle Store
// ============================================================================

/// Disk-backed, content-addressed bundle store.
///
/// # Invariants
/// - Layout: `<root>/<content-digest>/manifest.json` plus
///   `<root>/<content-digest>/rules/<file>`.
/// - Stored bundles are immutable; re-staging identical content is a no-op.
#[derive(Debug, Clone)]
pub struct BundleStore {
    /// Store root directory.
    root: PathBuf,
}

impl BundleStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] when the root cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| PolicyError::Storage(err.to_string()))?;
        Ok(Self {
            root,
        })
    }

    /// Persists a bundle's manifest and sources.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] on any write failure.
    pub fn persist(
        &self,
        manifest: &BundleManifest,
        sources: &[RuleSourceFile],
    ) -> Result<BundleId, PolicyError> {
        let bundle_id = manifest.bundle_id();
        let dir = self.bundle_dir(&bundle_id);
        let rules_dir = dir.join("rules");
        fs::create_dir_all(&rules_dir).map_err(|err| PolicyError::Storage(err.to_string()))?;

        for source in sources {
            if source.name.contains('/') || source.name.contains("..") {
                return Err(PolicyError::Storage(format!(
                    "unsafe source file name: {}",
                    source.name
                )));
            }
            fs::write(rules_dir.join(&source.name), source.content.as_bytes())
                .map_err(|err| PolicyError::Storage(err.to_string()))?;
        }
        let manifest_json = serde_json::to_vec_pretty(manifest)
            .map_err(|err| PolicyError::Storage(err.to_string()))?;
        fs::write(dir.join("manifest.json"), manifest_json)
            .map_err(|err| PolicyError::Storage(err.to_string()))?;
        Ok(bundle_id)
    }

    /// Loads a bundle's manifest and sources, verifying every digest.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownBundle`] for a missing bundle and
    /// [`PolicyError::Storage`] for digest mismatches or read failures.
    pub fn load(
        &self,
        bundle_id: &BundleId,
    ) -> Result<(BundleManifest, Vec<RuleSourceFile>), PolicyError> {
        let dir = self.bundle_dir(bundle_id);
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.exists() {
            return Err(PolicyError::UnknownBundle(bundle_id.to_string()));
        }
        let manifest_bytes =
            fs::read(&manifest_path).map_err(|err| PolicyError::Storage(err.to_string()))?;
        let manifest: BundleManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|err| PolicyError::Storage(err.to_string()))?;

        let mut sources = Vec::with_capacity(manifest.files.len());
        for file in &manifest.files {
            let bytes = fs::read(dir.join("rules").join(&file.name))
                .map_err(|err| PolicyError::Storage(err.to_string()))?;
            let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
            if digest != file.digest {
                return Err(PolicyError::Storage(format!(
                    "bundle file digest mismatch: {}",
                    file.name
                )));
            }
            let content = String::from_utf8(bytes)
                .map_err(|err| PolicyError::Storage(err.to_string()))?;
            sources.push(RuleSourceFile {
                name: file.name.clone(),
                content,
            });
        }

        let recomputed = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &manifest.files)
            .map_err(|err| PolicyError::Storage(err.to_string()))?;
        if recomputed != manifest.content_digest {
            return Err(PolicyError::Storage("bundle manifest digest mismatch".to_string()));
        }
        Ok((manifest, sources))
    }

    /// Returns the directory of a bundle.
    fn bundle_dir(&self, bundle_id: &BundleId) -> PathBuf {
        self.root.join(bundle_id.as_str())
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
