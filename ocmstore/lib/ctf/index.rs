use std::collections::BTreeSet;

use getset::Getters;
use oci_spec::image::Digest;
use serde::{Deserialize, Serialize};

use crate::{accessobj::StateHandler, artdesc::is_digest, OcmError, OcmResult, KIND_DESCRIPTOR};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The only supported schema version of a repository index.
pub const REPOSITORY_INDEX_SCHEMA_VERSION: u32 = 1;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An artifact of a repository, optionally tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ArtifactMeta {
    /// The namespace of the artifact.
    repository: String,

    /// The tag, empty for untagged entries.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,

    /// The digest of the artifact blob.
    digest: Digest,
}

/// The index of a common transport format archive.
///
/// The index holds at most one entry per tag and namespace. A digest without any tag in a
/// namespace keeps one untagged entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryIndex {
    entries: Vec<ArtifactMeta>,
}

/// The descriptor handler of common transport format archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryIndexHandler;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryDescriptor {
    schema_version: u32,

    #[serde(default)]
    artifacts: Vec<ArtifactMeta>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArtifactMeta {
    /// Creates an entry. An empty `tag` denotes an untagged entry.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>, digest: Digest) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            digest,
        }
    }

    /// Returns `true` if the entry has a tag.
    pub fn is_tagged(&self) -> bool {
        !self.tag.is_empty()
    }
}

impl RepositoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and validates a serialized index.
    pub fn decode(data: &[u8]) -> OcmResult<Self> {
        let descriptor: RepositoryDescriptor = serde_json::from_slice(data)?;
        if descriptor.schema_version != REPOSITORY_INDEX_SCHEMA_VERSION {
            return Err(OcmError::invalid(
                KIND_DESCRIPTOR,
                format!(
                    "unsupported repository index version {}",
                    descriptor.schema_version
                ),
            ));
        }

        let mut index = Self::new();
        for meta in descriptor.artifacts {
            index.add_artifact_info(meta);
        }
        Ok(index)
    }

    /// Serializes the index with its entries in sorted order.
    pub fn encode(&self) -> OcmResult<Vec<u8>> {
        let descriptor = RepositoryDescriptor {
            schema_version: REPOSITORY_INDEX_SCHEMA_VERSION,
            artifacts: self.get_descriptor(),
        };
        Ok(serde_json::to_vec(&descriptor)?)
    }

    /// Adds an entry.
    ///
    /// An untagged entry for a digest already known in its namespace is ignored. A tagged
    /// entry replaces the untagged entry of its digest and takes its tag away from any other
    /// digest. A digest losing its last tag that way keeps an untagged entry.
    pub fn add_artifact_info(&mut self, meta: ArtifactMeta) {
        if !meta.is_tagged() {
            if !self.has_digest(&meta.repository, &meta.digest) {
                self.entries.push(meta);
            }
            return;
        }

        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.repository == meta.repository && e.tag == meta.tag)
        {
            let previous = self.entries.remove(pos);
            if previous.digest != meta.digest
                && !self.has_digest(&previous.repository, &previous.digest)
            {
                tracing::debug!(
                    "tag {} moved away from {} in {}",
                    previous.tag,
                    previous.digest,
                    previous.repository
                );
                self.entries
                    .push(ArtifactMeta::new(previous.repository, "", previous.digest));
            }
        }

        self.entries.retain(|e| {
            e.is_tagged() || e.repository != meta.repository || e.digest != meta.digest
        });
        self.entries.push(meta);
    }

    /// Looks up an entry of `repository` by tag or digest.
    ///
    /// Digest references yield the entry added last for that digest.
    pub fn get_artifact_info(&self, repository: &str, reference: &str) -> Option<&ArtifactMeta> {
        let in_repository = || self.entries.iter().filter(move |e| e.repository == repository);

        if let Some(meta) = in_repository().find(|e| e.tag == reference) {
            return Some(meta);
        }

        let digest = is_digest(reference)?;
        in_repository().filter(|e| e.digest == digest).last()
    }

    /// Returns all entries for `digest` across namespaces.
    pub fn get_artifact_infos(&self, digest: &Digest) -> Vec<&ArtifactMeta> {
        self.entries.iter().filter(|e| e.digest == *digest).collect()
    }

    /// Returns the entries sorted by namespace, tag and digest.
    pub fn get_descriptor(&self) -> Vec<ArtifactMeta> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            (a.repository.as_str(), a.tag.as_str(), a.digest.to_string()).cmp(&(
                b.repository.as_str(),
                b.tag.as_str(),
                b.digest.to_string(),
            ))
        });
        entries
    }

    /// Returns the names of all namespaces, sorted.
    pub fn get_repositories(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.repository.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns the tags of `repository`, optionally restricted to one digest, sorted.
    pub fn get_tags(&self, repository: &str, digest: Option<&Digest>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.repository == repository && e.is_tagged())
            .filter(|e| digest.map_or(true, |d| e.digest == *d))
            .map(|e| e.tag.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns `true` if `repository` has an entry for `digest`.
    pub fn has_digest(&self, repository: &str, digest: &Digest) -> bool {
        self.entries
            .iter()
            .any(|e| e.repository == repository && e.digest == *digest)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl StateHandler for RepositoryIndexHandler {
    type State = RepositoryIndex;

    fn initial(&self) -> RepositoryIndex {
        RepositoryIndex::new()
    }

    fn encode(&self, state: &RepositoryIndex) -> OcmResult<Vec<u8>> {
        state.encode()
    }

    fn decode(&self, data: &[u8]) -> OcmResult<RepositoryIndex> {
        RepositoryIndex::decode(data)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;

    fn digests() -> anyhow::Result<(Digest, Digest)> {
        Ok((digest::for_bytes(b"one")?, digest::for_bytes(b"two")?))
    }

    #[test]
    fn test_tags_on_one_digest() -> anyhow::Result<()> {
        let (d1, _) = digests()?;
        let mut index = RepositoryIndex::new();
        let a1 = ArtifactMeta::new("repo1", "v1", d1.clone());
        let a2 = ArtifactMeta::new("repo1", "v2", d1.clone());
        index.add_artifact_info(a1.clone());
        index.add_artifact_info(a2.clone());

        assert_eq!(index.get_artifact_info("repo1", &d1.to_string()), Some(&a2));
        assert_eq!(index.get_artifact_info("repo1", "v1"), Some(&a1));
        assert_eq!(index.get_artifact_infos(&d1).len(), 2);
        assert_eq!(index.get_descriptor(), vec![a1, a2]);
        Ok(())
    }

    #[test]
    fn test_tag_replaces_untagged_entry() -> anyhow::Result<()> {
        let (d1, _) = digests()?;
        let mut index = RepositoryIndex::new();
        index.add_artifact_info(ArtifactMeta::new("repo1", "", d1.clone()));
        let tagged = ArtifactMeta::new("repo1", "v1", d1.clone());
        index.add_artifact_info(tagged.clone());
        index.add_artifact_info(ArtifactMeta::new("repo1", "", d1.clone()));

        assert_eq!(index.get_descriptor(), vec![tagged]);
        Ok(())
    }

    #[test]
    fn test_reassigned_tag_leaves_untagged_entry() -> anyhow::Result<()> {
        let (d1, d2) = digests()?;
        let mut index = RepositoryIndex::new();
        index.add_artifact_info(ArtifactMeta::new("repo1", "", d1.clone()));
        index.add_artifact_info(ArtifactMeta::new("repo1", "v1", d1.clone()));
        index.add_artifact_info(ArtifactMeta::new("repo1", "", d2.clone()));
        let moved = ArtifactMeta::new("repo1", "v1", d2.clone());
        index.add_artifact_info(moved.clone());

        let untagged = ArtifactMeta::new("repo1", "", d1.clone());
        assert_eq!(index.get_artifact_info("repo1", &d1.to_string()), Some(&untagged));
        assert_eq!(index.get_artifact_info("repo1", "v1"), Some(&moved));
        assert_eq!(index.get_descriptor(), vec![untagged, moved]);
        Ok(())
    }

    #[test]
    fn test_reassigned_tag_keeps_other_tag() -> anyhow::Result<()> {
        let (d1, d2) = digests()?;
        let mut index = RepositoryIndex::new();
        index.add_artifact_info(ArtifactMeta::new("repo1", "v1", d1.clone()));
        let kept = ArtifactMeta::new("repo1", "v2", d1.clone());
        index.add_artifact_info(kept.clone());
        let moved = ArtifactMeta::new("repo1", "v1", d2.clone());
        index.add_artifact_info(moved.clone());

        assert_eq!(index.get_artifact_info("repo1", &d1.to_string()), Some(&kept));
        assert_eq!(index.get_descriptor(), vec![moved, kept]);
        Ok(())
    }

    #[test]
    fn test_namespaces_are_separate() -> anyhow::Result<()> {
        let (d1, _) = digests()?;
        let mut index = RepositoryIndex::new();
        index.add_artifact_info(ArtifactMeta::new("repo1", "v1", d1.clone()));
        index.add_artifact_info(ArtifactMeta::new("repo2", "v2", d1.clone()));

        assert!(index.get_artifact_info("repo1", "v2").is_none());
        assert!(index.get_artifact_info("repo2", "v2").is_some());
        assert_eq!(index.get_repositories(), vec!["repo1", "repo2"]);
        assert_eq!(index.get_tags("repo2", Some(&d1)), vec!["v2"]);
        Ok(())
    }

    #[test]
    fn test_encoding() -> anyhow::Result<()> {
        let (d1, _) = digests()?;
        let mut index = RepositoryIndex::new();
        index.add_artifact_info(ArtifactMeta::new("repo1", "", d1.clone()));

        let encoded = String::from_utf8(index.encode()?)?;
        assert_eq!(
            encoded,
            format!(r#"{{"schemaVersion":1,"artifacts":[{{"repository":"repo1","digest":"{d1}"}}]}}"#)
        );
        assert_eq!(RepositoryIndex::decode(encoded.as_bytes())?, index);
        assert!(RepositoryIndex::decode(br#"{"schemaVersion":2}"#).is_err());
        Ok(())
    }
}
