use std::{collections::BTreeMap, str::FromStr};

use getset::Getters;
use oci_spec::image::{Digest, MediaType, Platform};
use serde::{Deserialize, Serialize};

use crate::{OcmError, OcmResult, KIND_DESCRIPTOR};

use super::{
    LEGACY_MAINARTIFACT_ANNOTATION, LEGACY_TAGS_ANNOTATION, MAINARTIFACT_ANNOTATION,
    OCITAG_ANNOTATION, TAGS_ANNOTATION,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The only supported schema version of an [`Index`].
pub const INDEX_SCHEMA_VERSION: u32 = 2;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The index of an artifact set.
///
/// It is serialized like an OCI image index. Annotations are kept in sorted maps so that
/// encoding the same index always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub with_prefix")]
pub struct Index {
    /// The schema version, always [`INDEX_SCHEMA_VERSION`].
    schema_version: u32,

    /// The media type of the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,

    /// The entries of the index.
    #[serde(default)]
    manifests: Vec<Descriptor>,

    /// Annotations of the whole set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<BTreeMap<String, String>>,
}

/// An entry of an [`Index`] referring to an artifact blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub with_prefix")]
pub struct Descriptor {
    /// The media type of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,

    /// The digest of the artifact blob.
    digest: Digest,

    /// The size of the artifact blob.
    size: u64,

    /// Locations the blob may be downloaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    urls: Option<Vec<String>>,

    /// Annotations of the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<BTreeMap<String, String>>,

    /// The platform the artifact is built for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<Platform>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Index {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            media_type: Some(MediaType::ImageIndex.to_string()),
            manifests: Vec::new(),
            annotations: None,
        }
    }

    /// Decodes and validates a serialized index.
    ///
    /// ## Errors
    ///
    /// Fails for malformed JSON and unsupported schema versions.
    pub fn decode(data: &[u8]) -> OcmResult<Self> {
        let index: Index = serde_json::from_slice(data)?;
        if index.schema_version != INDEX_SCHEMA_VERSION {
            return Err(OcmError::invalid(
                KIND_DESCRIPTOR,
                format!("unsupported schema version {}", index.schema_version),
            ));
        }
        Ok(index)
    }

    /// Serializes the index.
    pub fn encode(&self) -> OcmResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns the entries for modification.
    pub fn get_manifests_mut(&mut self) -> &mut Vec<Descriptor> {
        &mut self.manifests
    }

    /// Appends an entry.
    pub fn add_manifest(&mut self, descriptor: Descriptor) {
        self.manifests.push(descriptor);
    }

    /// Returns the first entry for `digest`.
    pub fn get_blob_descriptor(&self, digest: &Digest) -> Option<&Descriptor> {
        self.manifests.iter().find(|d| d.digest == *digest)
    }

    /// Returns the value of the index annotation `name`.
    pub fn get_annotation(&self, name: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(name))
            .map(String::as_str)
    }

    /// Sets the index annotation `name`.
    pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
    }

    /// Returns the reference of the main artifact.
    ///
    /// This is the value of the main artifact annotation or, if all entries refer to the same
    /// artifact, its digest. OCI sets hold one entry per tag, so a single tagged artifact may
    /// have several entries.
    pub fn get_main_reference(&self) -> Option<String> {
        let annotated = self
            .get_annotation(MAINARTIFACT_ANNOTATION)
            .or_else(|| self.get_annotation(LEGACY_MAINARTIFACT_ANNOTATION))
            .filter(|v| !v.is_empty());

        if let Some(main) = annotated {
            return Some(main.to_string());
        }

        let first = self.manifests.first()?;
        self.manifests
            .iter()
            .all(|d| d.digest == first.digest)
            .then(|| first.digest.to_string())
    }
}

impl Descriptor {
    /// Creates an entry for the blob with the given digest and size.
    pub fn new(digest: Digest, size: u64) -> Self {
        Self {
            media_type: None,
            digest,
            size,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    /// Sets the media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Sets the platform.
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    /// Returns the value of the annotation `name`.
    pub fn get_annotation(&self, name: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(name))
            .map(String::as_str)
    }

    /// Sets the annotation `name`.
    pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
    }

    /// Returns the tags of the entry, read from the tags annotation or its legacy name.
    pub fn get_tags(&self) -> Vec<String> {
        let value = self
            .get_annotation(TAGS_ANNOTATION)
            .or_else(|| self.get_annotation(LEGACY_TAGS_ANNOTATION))
            .unwrap_or_default();

        value
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    /// Returns the single OCI tag of the entry.
    pub fn get_oci_tag(&self) -> Option<&str> {
        self.get_annotation(OCITAG_ANNOTATION)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Returns the tags of the entry, falling back to its OCI tag if it has no tags annotation.
    pub fn get_effective_tags(&self) -> Vec<String> {
        let tags = self.get_tags();
        if !tags.is_empty() {
            return tags;
        }
        self.get_oci_tag().map(String::from).into_iter().collect()
    }

    /// Returns `true` if the entry is selected by `reference`.
    ///
    /// Digest references match the digest of the entry, all other references are compared
    /// with its effective tags.
    pub fn matches(&self, reference: &str) -> bool {
        match is_digest(reference) {
            Some(digest) => self.digest == digest,
            None => self.get_effective_tags().iter().any(|t| t == reference),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses `reference` as a digest if it looks like one.
pub fn is_digest(reference: &str) -> Option<Digest> {
    if !reference.contains(':') {
        return None;
    }
    Digest::from_str(reference).ok()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
