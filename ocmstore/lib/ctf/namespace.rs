use oci_spec::image::Digest;
use ocmutils::View;

use crate::{
    artdesc::Artifact,
    blob::{BlobAccess, BlobData, DataAccess, FileDataAccess},
    OcmError, OcmResult, KIND_ARTIFACT,
};

use super::{repository::RepositoryImpl, ArtifactMeta, RepositoryIndexHandler};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The artifacts of one namespace in a common transport format archive.
///
/// Blobs are shared by all namespaces of the archive, artifacts and tags are not.
#[derive(Debug)]
pub struct Namespace {
    repository: View<RepositoryImpl>,
    namespace: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Namespace {
    pub(super) fn new(repository: View<RepositoryImpl>, namespace: impl Into<String>) -> Self {
        Self {
            repository,
            namespace: namespace.into(),
        }
    }

    /// Returns the name of the namespace.
    pub fn get_namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns `true` once the namespace or the archive has been closed.
    pub fn is_closed(&self) -> bool {
        self.repository.is_closed() || self.repository.base().is_closed()
    }

    /// Returns `true` if the archive was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.repository.base().is_read_only()
    }

    /// Stores a blob in the archive.
    pub fn add_blob(&self, blob: &dyn BlobAccess) -> OcmResult<()> {
        self.check_open()?;
        self.repository.base().add_blob(blob)
    }

    /// Returns the size of a stored blob and access to its content.
    pub fn get_blob_data(&self, digest: &Digest) -> OcmResult<(u64, FileDataAccess)> {
        self.check_open()?;
        self.repository.base().get_blob_data(digest)
    }

    /// Adds an artifact to the namespace and tags it.
    ///
    /// ## Returns
    ///
    /// The serialized artifact as stored in the archive.
    pub fn add_artifact(&self, artifact: &Artifact, tags: &[&str]) -> OcmResult<BlobData> {
        self.check_open()?;
        let mut access = self.repository.base().lock();
        access.check_writable()?;

        let blob = artifact.to_blob()?;
        access.add_blob(&blob)?;

        let digest = blob.digest();
        let index = access
            .state_mut::<RepositoryIndexHandler>()?
            .get_state_mut()?;
        index.add_artifact_info(ArtifactMeta::new(&self.namespace, "", digest.clone()));
        for tag in effective_tags(tags) {
            index.add_artifact_info(ArtifactMeta::new(&self.namespace, tag, digest.clone()));
        }

        tracing::debug!("added artifact {} to {}", digest, self.namespace);
        Ok(blob)
    }

    /// Tags the artifact with the given digest. A tag already used in the namespace moves to
    /// this artifact.
    ///
    /// ## Errors
    ///
    /// Fails with an unknown artifact error if the namespace has no artifact with the digest.
    pub fn add_tags(&self, digest: &Digest, tags: &[&str]) -> OcmResult<()> {
        self.check_open()?;
        let mut access = self.repository.base().lock();
        access.check_writable()?;

        let index = access
            .state_mut::<RepositoryIndexHandler>()?
            .get_state_mut()?;
        if !index.has_digest(&self.namespace, digest) {
            return Err(OcmError::unknown(KIND_ARTIFACT, digest.to_string()));
        }
        for tag in effective_tags(tags) {
            index.add_artifact_info(ArtifactMeta::new(&self.namespace, tag, digest.clone()));
        }
        Ok(())
    }

    /// Returns all tags of the namespace, sorted.
    pub fn list_tags(&self) -> OcmResult<Vec<String>> {
        self.check_open()?;
        self.repository
            .read(|index| index.get_tags(&self.namespace, None))
    }

    /// Returns the tags of the artifact with the given digest, sorted.
    pub fn get_tags(&self, digest: &Digest) -> OcmResult<Vec<String>> {
        self.check_open()?;
        self.repository
            .read(|index| index.get_tags(&self.namespace, Some(digest)))
    }

    /// Returns `true` if `reference` selects an artifact of the namespace.
    pub fn has_artifact(&self, reference: &str) -> OcmResult<bool> {
        self.check_open()?;
        self.repository.read(|index| {
            index
                .get_artifact_info(&self.namespace, reference)
                .is_some()
        })
    }

    /// Loads the artifact selected by a tag or digest `reference`.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::NotFoundIn`] if the namespace has no such artifact.
    pub fn get_artifact(&self, reference: &str) -> OcmResult<Artifact> {
        self.check_open()?;
        let access = self.repository.base().lock();
        let digest = access
            .state::<RepositoryIndexHandler>()?
            .get_state()
            .get_artifact_info(&self.namespace, reference)
            .map(|meta| meta.get_digest().clone())
            .ok_or_else(|| OcmError::NotFoundIn {
                kind: KIND_ARTIFACT,
                name: reference.to_string(),
                namespace: self.namespace.clone(),
            })?;

        let (_, data) = access.get_blob_data(&digest)?;
        Artifact::decode(&data.get()?)
            .map_err(|e| e.with_context(format!("unable to decode artifact {digest}")))
    }

    /// Closes the namespace and its view on the archive.
    pub fn close(&self) -> OcmResult<()> {
        self.repository.close()
    }

    fn check_open(&self) -> OcmResult<()> {
        if self.repository.is_closed() {
            return Err(OcmError::Closed);
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn effective_tags<'a>(tags: &'a [&'a str]) -> impl Iterator<Item = &'a str> {
    tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty())
}
