use std::{
    collections::{BTreeSet, HashMap},
    io::Read,
    path::Path,
    sync::Arc,
};

use getset::Getters;
use oci_spec::image::{Digest, Platform};
use ocmutils::Closeable;
use typed_builder::TypedBuilder;

use crate::{
    accessobj::{
        AccessMode, AccessObject, AccessOptions, FileSystemBlobAccess, FormatRegistry,
        LockedBlobAccess,
    },
    artdesc::{
        Artifact, Descriptor, Index, MAINARTIFACT_ANNOTATION, OCITAG_ANNOTATION, TAGS_ANNOTATION,
    },
    blob::{BlobAccess, BlobData, DataAccess, DataBlob, FileDataAccess, MIME_OCTET},
    config::get_default_structure_format,
    OcmError, OcmResult, KIND_ARTIFACT,
};

use super::{
    ArtifactSetInfo, IndexHandler, StructureFormat, OCI_ARTIFACTSET_DESCRIPTOR_FILE_NAME,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for opening and creating artifact sets.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ArtifactSetOptions {
    /// Options of the underlying access object.
    #[builder(default)]
    access: AccessOptions,

    /// The structure of new sets. Defaults to [`get_default_structure_format`].
    #[builder(default, setter(strip_option))]
    structure: Option<StructureFormat>,
}

/// A set of OCI artifacts with their blobs, stored as a directory or an archive.
///
/// The set is described by an [`Index`]. Every entry refers to a manifest or index blob and
/// carries the tags of the artifact in annotations. All operations lock the underlying access
/// object for their whole read-modify-write cycle.
#[derive(Debug)]
pub struct ArtifactSet {
    base: FileSystemBlobAccess,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArtifactSet {
    /// Opens the artifact set at `path`, creating it if it is missing and `mode` allows it.
    ///
    /// ## Arguments
    ///
    /// * `mode` - The access mode
    /// * `path` - The path of the set in the options' path filesystem
    /// * `options` - The file format, filesystems and structure format
    ///
    /// ## Errors
    ///
    /// Fails if the path is missing without [`AccessMode::CREATE`], if its format cannot be
    /// detected or if its index is invalid.
    pub fn open(
        mode: AccessMode,
        path: impl AsRef<Path>,
        options: &ArtifactSetOptions,
    ) -> OcmResult<Self> {
        let obj = FormatRegistry::global().open_or_create(
            Box::new(options.info()),
            mode,
            path.as_ref(),
            &options.access,
        )?;
        Ok(Self::from_access_object(obj))
    }

    /// Creates a new artifact set at `path`.
    ///
    /// ## Errors
    ///
    /// Fails with an already exists error if `path` exists.
    pub fn create(path: impl AsRef<Path>, options: &ArtifactSetOptions) -> OcmResult<Self> {
        let obj = FormatRegistry::global().create(
            Box::new(options.info()),
            path.as_ref(),
            &options.access,
        )?;
        Ok(Self::from_access_object(obj))
    }

    /// Opens a serialized artifact set read-only.
    ///
    /// Media types ending with `+gzip` are read as compressed archives.
    pub fn open_from_data(
        data: &dyn DataAccess,
        mime_type: &str,
        options: &ArtifactSetOptions,
    ) -> OcmResult<Self> {
        Self::open_from_reader(data.reader()?, mime_type, options)
    }

    /// Opens an artifact set stored in a blob read-only.
    pub fn open_from_blob(blob: &dyn BlobAccess, options: &ArtifactSetOptions) -> OcmResult<Self> {
        Self::open_from_reader(blob.reader()?, blob.mime_type(), options)
    }

    /// Wraps an access object whose layout is an [`ArtifactSetInfo`].
    pub fn from_access_object(obj: AccessObject) -> Self {
        Self {
            base: FileSystemBlobAccess::new(obj),
        }
    }

    /// Returns `true` if the set uses one of the OCI structure formats.
    pub fn is_oci(&self) -> bool {
        uses_oci_layout(&self.base.lock())
    }

    /// Returns `true` once the set has been closed.
    pub fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    /// Returns `true` if the set was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.base.is_read_only()
    }

    /// Persists the index if it changed.
    pub fn update(&self) -> OcmResult<bool> {
        self.base.update()
    }

    /// Writes the set to `path` in the file format of `options`.
    pub fn write(&self, path: impl AsRef<Path>, options: &AccessOptions) -> OcmResult<()> {
        self.base.write(path.as_ref(), options)
    }

    /// Closes the set, persisting the index and, for archives, the archive.
    pub fn close(&self) -> OcmResult<()> {
        self.base.close()
    }

    /// Returns a copy of the index.
    pub fn get_index(&self) -> OcmResult<Index> {
        self.read(Index::clone)
    }

    /// Sets an annotation of the whole set.
    pub fn annotate(&self, name: &str, value: &str) -> OcmResult<()> {
        self.modify(|index, _| {
            index.set_annotation(name, value);
            Ok(())
        })
    }

    /// Returns an annotation of the whole set.
    pub fn get_annotation(&self, name: &str) -> OcmResult<Option<String>> {
        self.read(|index| index.get_annotation(name).map(String::from))
    }

    /// Returns `true` if the set has the annotation `name`.
    pub fn has_annotation(&self, name: &str) -> OcmResult<bool> {
        self.read(|index| index.get_annotation(name).is_some())
    }

    /// Marks the artifact selected by `reference` as the main artifact.
    pub fn set_main_artifact(&self, reference: &str) -> OcmResult<()> {
        self.annotate(MAINARTIFACT_ANNOTATION, reference)
    }

    /// Returns the digest of the main artifact.
    ///
    /// The main artifact is the one named by the main artifact annotation or, if the set has
    /// a single entry, that entry.
    pub fn get_main(&self) -> OcmResult<Option<Digest>> {
        self.read(|index| {
            index
                .get_main_reference()
                .and_then(|reference| find_digest(index, &reference))
        })
    }

    /// Resolves a tag or digest reference.
    pub fn get_digest(&self, reference: &str) -> OcmResult<Option<Digest>> {
        self.read(|index| find_digest(index, reference))
    }

    /// Stores a blob.
    pub fn add_blob(&self, blob: &dyn BlobAccess) -> OcmResult<()> {
        self.base.add_blob(blob)
    }

    /// Returns the size of a stored blob and access to its content.
    pub fn get_blob_data(&self, digest: &Digest) -> OcmResult<(u64, FileDataAccess)> {
        self.base.get_blob_data(digest)
    }

    /// Returns a stored blob, typed with its index media type if it is an artifact.
    pub fn get_blob(&self, digest: &Digest) -> OcmResult<DataBlob> {
        let access = self.base.lock();
        let (size, data) = access.get_blob_data(digest)?;
        let mime_type = access
            .state::<IndexHandler>()?
            .get_state()
            .get_blob_descriptor(digest)
            .and_then(|d| d.get_media_type().clone())
            .unwrap_or_else(|| MIME_OCTET.to_string());
        Ok(DataBlob::new(Arc::new(data), digest.clone(), size, mime_type))
    }

    /// Returns all tags in the set, sorted.
    pub fn list_tags(&self) -> OcmResult<Vec<String>> {
        self.read(|index| collect_tags(index.get_manifests().iter()))
    }

    /// Returns the tags of the artifact with the given digest, sorted.
    pub fn get_tags(&self, digest: &Digest) -> OcmResult<Vec<String>> {
        self.read(|index| {
            collect_tags(
                index
                    .get_manifests()
                    .iter()
                    .filter(|d| d.get_digest() == digest),
            )
        })
    }

    /// Returns `true` if `reference` selects an artifact of the set.
    pub fn has_artifact(&self, reference: &str) -> OcmResult<bool> {
        self.read(|index| index.get_manifests().iter().any(|d| d.matches(reference)))
    }

    /// Loads the artifact selected by `reference`.
    ///
    /// ## Errors
    ///
    /// Fails with a not found error if no entry matches `reference`.
    pub fn get_artifact(&self, reference: &str) -> OcmResult<Artifact> {
        let access = self.base.lock();
        let digest = find_digest(access.state::<IndexHandler>()?.get_state(), reference)
            .ok_or_else(|| OcmError::not_found(KIND_ARTIFACT, reference))?;

        let (_, data) = access.get_blob_data(&digest)?;
        Artifact::decode(&data.get()?)
            .map_err(|e| e.with_context(format!("unable to decode artifact {digest}")))
    }

    /// Sets an annotation on the first entry of the artifact with the given digest.
    ///
    /// ## Errors
    ///
    /// Fails with an unknown artifact error if the digest is not in the index.
    pub fn annotate_artifact(&self, digest: &Digest, name: &str, value: &str) -> OcmResult<()> {
        self.modify(|index, _| {
            let entry = index
                .get_manifests_mut()
                .iter_mut()
                .find(|d| d.get_digest() == digest)
                .ok_or_else(|| OcmError::unknown(KIND_ARTIFACT, digest.to_string()))?;
            entry.set_annotation(name, value);
            Ok(())
        })
    }

    /// Adds an artifact and tags it.
    ///
    /// ## Returns
    ///
    /// The serialized artifact as stored in the set.
    pub fn add_artifact(&self, artifact: &Artifact, tags: &[&str]) -> OcmResult<BlobData> {
        let blob = self.add_platform_artifact(artifact, None)?;
        self.add_tags(&blob.digest(), tags)?;
        Ok(blob)
    }

    /// Adds an artifact built for `platform`.
    ///
    /// The artifact is stored as a blob and an index entry is appended unless one for the same
    /// digest and platform exists. Entries of OCI sets carry the media type of the artifact.
    pub fn add_platform_artifact(
        &self,
        artifact: &Artifact,
        platform: Option<Platform>,
    ) -> OcmResult<BlobData> {
        let mut access = self.base.lock();
        access.check_writable()?;

        let blob = artifact.to_blob()?;
        access.add_blob(&blob)?;

        let mut entry = Descriptor::new(blob.digest(), blob.size()).with_platform(platform);
        if uses_oci_layout(&access) {
            entry = entry.with_media_type(blob.mime_type());
        }

        let index = access.state_mut::<IndexHandler>()?.get_state_mut()?;
        let known = index.get_manifests().iter().any(|d| {
            d.get_digest() == entry.get_digest() && d.get_platform() == entry.get_platform()
        });
        if !known {
            index.add_manifest(entry);
        }

        tracing::debug!("added artifact {}", blob.get_digest());
        Ok(blob)
    }

    /// Adds tags to the artifact with the given digest.
    ///
    /// The tags are merged with the existing ones, including the OCI tag of entries without a
    /// tags annotation. OCI sets get one index entry per tag, each naming its tag in the OCI tag
    /// annotation, so that generic OCI tooling sees every tag. Entries of the artifact for
    /// another platform than its first entry are kept as they are. All entries of the artifact
    /// carry the complete, sorted tag list.
    ///
    /// ## Errors
    ///
    /// Fails with an unknown artifact error if the digest is not in the index.
    pub fn add_tags(&self, digest: &Digest, tags: &[&str]) -> OcmResult<()> {
        let mut access = self.base.lock();
        access.check_open()?;
        if tags.is_empty() {
            return Ok(());
        }

        let oci = uses_oci_layout(&access);
        let index = access.state_mut::<IndexHandler>()?.get_state_mut()?;
        tag_artifact(index, digest, tags, oci)
    }

    fn open_from_reader(
        reader: Box<dyn Read + Send>,
        mime_type: &str,
        options: &ArtifactSetOptions,
    ) -> OcmResult<Self> {
        let obj = FormatRegistry::global().open_from_data(
            Box::new(options.info()),
            mime_type,
            reader,
            &options.access,
        )?;
        Ok(Self::from_access_object(obj))
    }

    fn read<T>(&self, f: impl FnOnce(&Index) -> T) -> OcmResult<T> {
        let access = self.base.lock();
        let state = access.state::<IndexHandler>()?;
        Ok(f(state.get_state()))
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Index, bool) -> OcmResult<T>) -> OcmResult<T> {
        let mut access = self.base.lock();
        let oci = uses_oci_layout(&access);
        let index = access.state_mut::<IndexHandler>()?.get_state_mut()?;
        f(index, oci)
    }
}

impl ArtifactSetOptions {
    fn info(&self) -> ArtifactSetInfo {
        ArtifactSetInfo::new(
            self.structure.unwrap_or_else(get_default_structure_format),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn uses_oci_layout(access: &LockedBlobAccess<'_>) -> bool {
    access.get_info().descriptor_file_name() == OCI_ARTIFACTSET_DESCRIPTOR_FILE_NAME
}

fn find_digest(index: &Index, reference: &str) -> Option<Digest> {
    index
        .get_manifests()
        .iter()
        .find(|d| d.matches(reference))
        .map(|d| d.get_digest().clone())
}

fn collect_tags<'a>(entries: impl Iterator<Item = &'a Descriptor>) -> Vec<String> {
    let tags: BTreeSet<String> = entries.flat_map(Descriptor::get_effective_tags).collect();
    tags.into_iter().collect()
}

fn tag_artifact(index: &mut Index, digest: &Digest, tags: &[&str], oci: bool) -> OcmResult<()> {
    let manifests = index.get_manifests_mut();
    let positions: Vec<usize> = manifests
        .iter()
        .enumerate()
        .filter(|(_, d)| d.get_digest() == digest)
        .map(|(i, _)| i)
        .collect();
    let Some(&first) = positions.first() else {
        return Err(OcmError::unknown(KIND_ARTIFACT, digest.to_string()));
    };

    let mut all: BTreeSet<String> = positions
        .iter()
        .flat_map(|&i| manifests[i].get_effective_tags())
        .collect();
    all.extend(
        tags.iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from),
    );
    if all.is_empty() {
        return Ok(());
    }
    let joined = all.iter().map(String::as_str).collect::<Vec<_>>().join(",");

    if !oci {
        manifests[first].set_annotation(TAGS_ANNOTATION, joined.as_str());
        return Ok(());
    }

    // Only entries for the platform of the first entry are fanned out. Entries of the same
    // digest for other platforms stay where they are and just get the tag list.
    let template = manifests[first].clone();
    let fanned_out =
        |d: &Descriptor| d.get_digest() == digest && d.get_platform() == template.get_platform();

    let mut by_tag: HashMap<String, Descriptor> = HashMap::new();
    for &i in &positions {
        if !fanned_out(&manifests[i]) {
            manifests[i].set_annotation(TAGS_ANNOTATION, joined.as_str());
            continue;
        }
        if let Some(tag) = manifests[i].get_oci_tag() {
            by_tag
                .entry(tag.to_string())
                .or_insert_with(|| manifests[i].clone());
        }
    }

    let normalized: Vec<Descriptor> = all
        .iter()
        .map(|tag| {
            let mut entry = by_tag.remove(tag).unwrap_or_else(|| template.clone());
            entry.set_annotation(TAGS_ANNOTATION, joined.as_str());
            entry.set_annotation(OCITAG_ANNOTATION, tag.as_str());
            entry
        })
        .collect();

    manifests.retain(|d| !fanned_out(d));
    manifests.extend(normalized);

    tracing::debug!("tagged {} with {}", digest, joined);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ArtifactSetOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Closeable for ArtifactSet {
    type Error = OcmError;

    fn close(&self) -> OcmResult<()> {
        ArtifactSet::close(self)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artdesc::OCITAG_ANNOTATION,
        blob::{MIME_JSON, MIME_OCTET},
        digest,
    };

    fn manifest() -> anyhow::Result<Artifact> {
        let config = BlobData::for_string(MIME_JSON, "{}")?;
        let layer = BlobData::for_string(MIME_OCTET, "testdata")?;
        Ok(Artifact::new_manifest(&config, &[&layer])?)
    }

    fn entry(tags: Option<&str>) -> anyhow::Result<Descriptor> {
        let mut entry = Descriptor::new(digest::for_bytes(b"{}")?, 2);
        if let Some(tags) = tags {
            entry.set_annotation(TAGS_ANNOTATION, tags);
        }
        Ok(entry)
    }

    #[test]
    fn test_tag_artifact_ocm() -> anyhow::Result<()> {
        let digest = digest::for_bytes(b"{}")?;
        let mut index = Index::new();
        index.add_manifest(entry(Some("v1"))?);

        tag_artifact(&mut index, &digest, &[" latest ", "", "v1"], false)?;

        assert_eq!(index.get_manifests().len(), 1);
        assert_eq!(
            index.get_manifests()[0].get_annotation(TAGS_ANNOTATION),
            Some("latest,v1")
        );
        assert_eq!(index.get_manifests()[0].get_annotation(OCITAG_ANNOTATION), None);
        Ok(())
    }

    #[test]
    fn test_tag_artifact_oci_fans_out() -> anyhow::Result<()> {
        let digest = digest::for_bytes(b"{}")?;
        let other = Descriptor::new(digest::for_bytes(b"testdata")?, 8);
        let mut index = Index::new();
        index.add_manifest(entry(None)?);
        index.add_manifest(other.clone());

        tag_artifact(&mut index, &digest, &["v1", "latest"], true)?;
        tag_artifact(&mut index, &digest, &["v1"], true)?;

        let manifests = index.get_manifests();
        assert_eq!(manifests.len(), 3);
        assert_eq!(manifests[0], other);

        let oci_tags: Vec<_> = manifests[1..]
            .iter()
            .map(|d| d.get_oci_tag().unwrap_or_default())
            .collect();
        assert_eq!(oci_tags, vec!["latest", "v1"]);
        for d in &manifests[1..] {
            assert_eq!(d.get_annotation(TAGS_ANNOTATION), Some("latest,v1"));
        }
        assert_eq!(
            collect_tags(manifests.iter()),
            vec!["latest".to_string(), "v1".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_tag_artifact_oci_keeps_single_oci_tag() -> anyhow::Result<()> {
        let digest = digest::for_bytes(b"{}")?;
        let mut tagged = entry(None)?;
        tagged.set_annotation(OCITAG_ANNOTATION, "v0");
        let mut index = Index::new();
        index.add_manifest(tagged);

        tag_artifact(&mut index, &digest, &["v1"], true)?;

        let manifests = index.get_manifests();
        assert_eq!(manifests.len(), 2);
        let oci_tags: Vec<_> = manifests.iter().filter_map(|d| d.get_oci_tag()).collect();
        assert_eq!(oci_tags, vec!["v0", "v1"]);
        for d in manifests {
            assert_eq!(d.get_annotation(TAGS_ANNOTATION), Some("v0,v1"));
        }
        Ok(())
    }

    #[test]
    fn test_tag_artifact_oci_keeps_other_platforms() -> anyhow::Result<()> {
        let digest = digest::for_bytes(b"{}")?;
        let arm: Platform = serde_json::from_str(r#"{"architecture":"arm64","os":"linux"}"#)?;
        let mut index = Index::new();
        index.add_manifest(entry(None)?);
        index.add_manifest(entry(None)?.with_platform(Some(arm.clone())));

        tag_artifact(&mut index, &digest, &["v1", "latest"], true)?;

        let manifests = index.get_manifests();
        assert_eq!(manifests.len(), 3);
        assert_eq!(manifests[0].get_platform().as_ref(), Some(&arm));
        assert_eq!(manifests[0].get_oci_tag(), None);
        assert_eq!(manifests[0].get_annotation(TAGS_ANNOTATION), Some("latest,v1"));
        assert!(manifests[1..].iter().all(|d| d.get_platform().is_none()));
        Ok(())
    }

    #[test]
    fn test_tag_unknown_artifact() -> anyhow::Result<()> {
        let mut index = Index::new();
        let err = tag_artifact(&mut index, &digest::for_bytes(b"{}")?, &["v1"], true).unwrap_err();
        assert!(matches!(err, OcmError::Unknown { kind: KIND_ARTIFACT, .. }));
        Ok(())
    }

    #[test_log::test]
    fn test_artifact_set_in_memory() -> anyhow::Result<()> {
        let options = ArtifactSetOptions::builder()
            .access(
                AccessOptions::builder()
                    .path_fs(Arc::new(virtualfs::MemoryFileSystem::new()))
                    .build(),
            )
            .structure(StructureFormat::Oci)
            .build();

        let set = ArtifactSet::open(AccessMode::CREATE, "set", &options)?;
        assert!(set.is_oci());

        let blob = set.add_artifact(&manifest()?, &["v1"])?;
        assert_eq!(set.get_digest("v1")?, Some(blob.digest()));
        assert_eq!(set.get_main()?, Some(blob.digest()));
        assert!(set.has_artifact(&blob.digest().to_string())?);
        assert!(!set.has_artifact("v2")?);
        assert!(set.get_artifact("v1")?.is_manifest());
        assert!(set.get_artifact("v2").unwrap_err().is_not_found());

        let stored = set.get_blob(&blob.digest())?;
        assert_eq!(stored.mime_type(), blob.mime_type());

        set.annotate_artifact(&blob.digest(), "key", "value")?;
        assert_eq!(
            set.get_index()?.get_manifests()[0].get_annotation("key"),
            Some("value")
        );

        set.annotate("owner", "team")?;
        assert_eq!(set.get_annotation("owner")?.as_deref(), Some("team"));
        assert!(!set.has_annotation("missing")?);

        set.close()?;
        assert!(set.close().unwrap_err().is_closed());
        assert!(set.list_tags().unwrap_err().is_closed());
        Ok(())
    }
}
