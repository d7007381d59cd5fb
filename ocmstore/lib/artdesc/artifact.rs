use oci_spec::image::{
    Descriptor as OciDescriptor, DescriptorBuilder, ImageIndex, ImageManifest,
    ImageManifestBuilder, MediaType,
};
use serde_json::Value;

use crate::{
    blob::{BlobAccess, BlobData},
    OcmResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An artifact stored in an artifact set, either an OCI image manifest or an OCI image index.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// An image manifest.
    Manifest(ImageManifest),

    /// An image index.
    Index(ImageIndex),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Artifact {
    /// Creates an image manifest artifact for a config blob and its layers.
    pub fn new_manifest(config: &dyn BlobAccess, layers: &[&dyn BlobAccess]) -> OcmResult<Self> {
        let layers = layers
            .iter()
            .map(|layer| oci_descriptor(*layer))
            .collect::<OcmResult<Vec<_>>>()?;

        let manifest = ImageManifestBuilder::default()
            .schema_version(2_u32)
            .media_type(MediaType::ImageManifest)
            .config(oci_descriptor(config)?)
            .layers(layers)
            .build()?;

        Ok(Self::Manifest(manifest))
    }

    /// Decodes a serialized manifest or index.
    ///
    /// The kind is taken from the `mediaType` field if it names an OCI manifest or index,
    /// otherwise documents with a `manifests` list are read as indexes.
    pub fn decode(data: &[u8]) -> OcmResult<Self> {
        let value: Value = serde_json::from_slice(data)?;
        let media_type = value
            .get("mediaType")
            .and_then(Value::as_str)
            .map(MediaType::from);

        let is_index = match media_type {
            Some(MediaType::ImageIndex) => true,
            Some(MediaType::ImageManifest) => false,
            _ => value.get("manifests").is_some(),
        };

        if is_index {
            Ok(Self::Index(serde_json::from_value(value)?))
        } else {
            Ok(Self::Manifest(serde_json::from_value(value)?))
        }
    }

    /// Returns the media type of the artifact.
    pub fn get_media_type(&self) -> String {
        match self {
            Self::Manifest(m) => m.media_type().clone().unwrap_or(MediaType::ImageManifest),
            Self::Index(i) => i.media_type().clone().unwrap_or(MediaType::ImageIndex),
        }
        .to_string()
    }

    /// Serializes the artifact into a blob typed with its media type.
    pub fn to_blob(&self) -> OcmResult<BlobData> {
        let data = match self {
            Self::Manifest(m) => serde_json::to_vec(m)?,
            Self::Index(i) => serde_json::to_vec(i)?,
        };
        BlobData::for_data(self.get_media_type(), data)
    }

    /// Returns the blobs the artifact refers to.
    ///
    /// For manifests these are the config and the layers, for indexes the nested manifests.
    pub fn get_referenced_blobs(&self) -> Vec<&OciDescriptor> {
        match self {
            Self::Manifest(m) => std::iter::once(m.config()).chain(m.layers()).collect(),
            Self::Index(i) => i.manifests().iter().collect(),
        }
    }

    /// Returns `true` for image manifests.
    pub fn is_manifest(&self) -> bool {
        matches!(self, Self::Manifest(_))
    }

    /// Returns `true` for image indexes.
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn oci_descriptor(blob: &dyn BlobAccess) -> OcmResult<OciDescriptor> {
    Ok(DescriptorBuilder::default()
        .media_type(MediaType::from(blob.mime_type()))
        .digest(blob.digest())
        .size(blob.size())
        .build()?)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<ImageManifest> for Artifact {
    fn from(manifest: ImageManifest) -> Self {
        Self::Manifest(manifest)
    }
}

impl From<ImageIndex> for Artifact {
    fn from(index: ImageIndex) -> Self {
        Self::Index(index)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{MIME_JSON, MIME_OCTET};

    #[test]
    fn test_manifest_blob_decodes() -> anyhow::Result<()> {
        let config = BlobData::for_string(MIME_JSON, "{}")?;
        let layer = BlobData::for_string(MIME_OCTET, "testdata")?;
        let artifact = Artifact::new_manifest(&config, &[&layer])?;

        let blob = artifact.to_blob()?;
        assert_eq!(blob.mime_type(), MediaType::ImageManifest.to_string());

        let decoded = Artifact::decode(blob.get_data())?;
        assert!(decoded.is_manifest());

        let referenced: Vec<String> = decoded
            .get_referenced_blobs()
            .iter()
            .map(|d| d.digest().to_string())
            .collect();
        assert_eq!(
            referenced,
            vec![config.digest().to_string(), layer.digest().to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_decode_index_without_media_type() -> anyhow::Result<()> {
        let artifact = Artifact::decode(br#"{"schemaVersion": 2, "manifests": []}"#)?;
        assert!(artifact.is_index());
        assert_eq!(artifact.get_media_type(), MediaType::ImageIndex.to_string());
        Ok(())
    }
}
