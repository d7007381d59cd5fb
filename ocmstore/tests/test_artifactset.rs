use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Read,
    path::Path,
    sync::Arc,
};

use flate2::read::GzDecoder;
use oci_spec::image::Digest;
use ocmstore::{
    accessobj::{validate_descriptor, AccessMode, AccessOptions, FileFormat},
    artdesc::{Artifact, OCITAG_ANNOTATION, TAGS_ANNOTATION},
    artifactset::{ArtifactSet, ArtifactSetInfo, ArtifactSetOptions, StructureFormat},
    blob::{BlobAccess, BlobData, DataAccess, MIME_JSON, MIME_OCTET},
    OcmError,
};
use tempfile::{tempdir, TempDir};
use virtualfs::NativeFileSystem;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const LAYER_HEX: &str = "810ff2fb242a5dee4220f2cb0e6a519891fb67f2f828a6cab4ef8894633b1f50";

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test]
fn test_artifactset_directory_roundtrip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let options = options(&dir, None, StructureFormat::Oci);

    let set = ArtifactSet::open(AccessMode::CREATE, "test", &options)?;
    let blob = add_test_artifact(&set, &["v1"])?;
    set.close()?;

    let root = dir.path().join("test");
    assert!(root.join("index.json").is_file());
    assert!(root.join("oci-layout").is_file());
    assert!(root.join("blobs").join(format!("sha256.{LAYER_HEX}")).is_file());

    let set = ArtifactSet::open(AccessMode::READONLY, "test", &options)?;
    assert!(set.is_read_only());
    assert_eq!(set.list_tags()?, vec!["v1"]);
    assert_eq!(set.get_tags(&blob.digest())?, vec!["v1"]);
    assert_eq!(read_layer(&set, "v1")?, b"testdata");
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_archive_roundtrip() -> anyhow::Result<()> {
    for format in [FileFormat::Tar, FileFormat::Tgz] {
        let dir = tempdir()?;
        let create = options(&dir, Some(format), StructureFormat::Ocm);

        let set = ArtifactSet::create(format!("test{}", format.suffix()), &create)?;
        add_test_artifact(&set, &["v1"])?;
        set.close()?;

        let detect = options(&dir, None, StructureFormat::Oci);
        let set = ArtifactSet::open(
            AccessMode::WRITABLE,
            format!("test{}", format.suffix()),
            &detect,
        )?;
        assert!(!set.is_oci());
        assert_eq!(set.list_tags()?, vec!["v1"]);
        assert_eq!(read_layer(&set, "v1")?, b"testdata");
        set.close()?;

        let names = archive_entries(&dir.path().join(format!("test{}", format.suffix())))?;
        assert!(names.contains("artifact-descriptor.json"));
        assert!(!names.contains("oci-layout"));
        assert!(names.contains(&format!("blobs/sha256.{LAYER_HEX}")));
    }
    Ok(())
}

#[test_log::test]
fn test_artifactset_oci_tags_fan_out() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let set = ArtifactSet::create("test", &options(&dir, None, StructureFormat::Oci))?;
    let blob = add_test_artifact(&set, &["v1", "latest"])?;

    let index = set.get_index()?;
    assert_eq!(index.get_manifests().len(), 2);

    let oci_tags: BTreeSet<&str> = index
        .get_manifests()
        .iter()
        .filter_map(|d| d.get_annotation(OCITAG_ANNOTATION))
        .collect();
    assert_eq!(oci_tags, BTreeSet::from(["latest", "v1"]));
    for entry in index.get_manifests() {
        assert_eq!(entry.get_digest(), &blob.digest());
        assert_eq!(entry.get_annotation(TAGS_ANNOTATION), Some("latest,v1"));
    }

    assert_eq!(set.list_tags()?, vec!["latest", "v1"]);
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_nested_blob_layout() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let nested = options(&dir, Some(FileFormat::Tgz), StructureFormat::OciCompliant);
    let set = ArtifactSet::create("nested.tgz", &nested)?;
    add_test_artifact(&set, &["v1"])?;
    set.close()?;

    let names = archive_entries(&dir.path().join("nested.tgz"))?;
    assert!(names.contains("index.json"));
    assert!(names.contains("oci-layout"));
    assert!(names.contains("blobs/sha256"));
    assert!(names.contains(&format!("blobs/sha256/{LAYER_HEX}")));

    let flat = options(&dir, Some(FileFormat::Tgz), StructureFormat::Oci);
    let set = ArtifactSet::create("flat.tgz", &flat)?;
    add_test_artifact(&set, &["v1"])?;
    set.close()?;

    let names = archive_entries(&dir.path().join("flat.tgz"))?;
    assert!(names.contains(&format!("blobs/sha256.{LAYER_HEX}")));
    assert!(!names.contains("blobs/sha256"));

    // Nested blob directories are recognized when reopening.
    let set = ArtifactSet::open(AccessMode::READONLY, "nested.tgz", &flat)?;
    assert_eq!(read_layer(&set, "v1")?, b"testdata");
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_read_only_and_closed() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let options = options(&dir, Some(FileFormat::Tgz), StructureFormat::Oci);

    let set = ArtifactSet::create("test.tgz", &options)?;
    let blob = add_test_artifact(&set, &["v1"])?;
    set.close()?;
    assert!(matches!(set.add_blob(&blob), Err(OcmError::Closed)));
    assert!(set.get_artifact("v1").unwrap_err().is_closed());

    let modified = File::open(dir.path().join("test.tgz"))?.metadata()?.modified()?;
    let set = ArtifactSet::open(AccessMode::READONLY, "test.tgz", &options)?;
    let extra = BlobData::for_string(MIME_OCTET, "extra")?;
    assert!(set.add_blob(&extra).unwrap_err().is_read_only());
    assert!(set.add_tags(&blob.digest(), &["v2"]).unwrap_err().is_read_only());
    set.close()?;

    let after = File::open(dir.path().join("test.tgz"))?.metadata()?.modified()?;
    assert_eq!(modified, after);
    Ok(())
}

#[test_log::test]
fn test_artifactset_add_blob_is_idempotent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let set = ArtifactSet::create("test", &options(&dir, None, StructureFormat::Ocm))?;
    let layer = BlobData::for_string(MIME_OCTET, "testdata")?;

    set.add_blob(&layer)?;
    set.add_blob(&layer)?;

    let (size, data) = set.get_blob_data(&layer.digest())?;
    assert_eq!(size, 8);
    assert_eq!(data.get()?, b"testdata");

    let blobs = std::fs::read_dir(dir.path().join("test").join("blobs"))?.count();
    assert_eq!(blobs, 1);
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_validate_descriptor() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fs = NativeFileSystem::new(dir.path());

    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        File::create(dir.path().join("empty.tgz"))?,
        flate2::Compression::default(),
    ));
    let mut header = tar::Header::new_gnu();
    header.set_size(4);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    builder.append_data(&mut header, "blobs/unrelated", &b"data"[..])?;
    builder.into_inner()?.finish()?;

    let info = ArtifactSetInfo::new(StructureFormat::Oci);
    let err = validate_descriptor(&info, Path::new("empty.tgz"), &fs).unwrap_err();
    assert!(matches!(err, OcmError::NoDescriptorFound { .. }));

    let options = options(&dir, Some(FileFormat::Tgz), StructureFormat::Oci);
    let set = ArtifactSet::create("valid.tgz", &options)?;
    add_test_artifact(&set, &["v1"])?;
    set.close()?;
    validate_descriptor(&info, Path::new("valid.tgz"), &fs)?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_open_from_blob() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let options = options(&dir, Some(FileFormat::Tgz), StructureFormat::Oci);
    let set = ArtifactSet::create("test.tgz", &options)?;
    add_test_artifact(&set, &["v1"])?;
    set.close()?;

    let data = std::fs::read(dir.path().join("test.tgz"))?;
    let archive = BlobData::for_data("application/vnd.oci.image.layout.v1.tar+gzip", data)?;
    let set = ArtifactSet::open_from_blob(&archive, &ArtifactSetOptions::default())?;
    assert!(set.is_read_only());
    assert_eq!(read_layer(&set, "v1")?, b"testdata");
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_roundtrip_keeps_tags_and_main() -> anyhow::Result<()> {
    for structure in [StructureFormat::Ocm, StructureFormat::Oci] {
        for format in [FileFormat::Directory, FileFormat::Tar, FileFormat::Tgz] {
            let dir = tempdir()?;
            let path = format!("set{}", format.suffix());

            let set = ArtifactSet::create(&path, &options(&dir, Some(format), structure))?;
            let first = add_manifest(&set, "first", &["v1", "latest"])?;
            let second = add_manifest(&set, "second", &["v2"])?;
            let untagged = add_manifest(&set, "untagged", &[])?;
            set.set_main_artifact("v2")?;

            let digests = [first.digest(), second.digest(), untagged.digest()];
            let expected = tag_map(&set, &digests)?;
            assert_eq!(expected[&untagged.digest().to_string()], Vec::<String>::new());
            assert_eq!(set.get_main()?, Some(second.digest()));
            set.close()?;

            let set = ArtifactSet::open(
                AccessMode::READONLY,
                &path,
                &options(&dir, None, StructureFormat::Ocm),
            )?;
            assert_eq!(set.is_oci(), structure != StructureFormat::Ocm);
            assert_eq!(tag_map(&set, &digests)?, expected, "{structure:?} {format}");
            assert_eq!(set.get_main()?, Some(second.digest()));
            assert!(set.has_artifact(&untagged.digest().to_string())?);
            assert_eq!(set.list_tags()?, vec!["latest", "v1", "v2"]);
            set.close()?;
        }
    }
    Ok(())
}

#[test_log::test]
fn test_artifactset_single_artifact_is_main() -> anyhow::Result<()> {
    for structure in [StructureFormat::Ocm, StructureFormat::Oci] {
        let dir = tempdir()?;
        let set = ArtifactSet::create("test", &options(&dir, None, structure))?;
        let blob = add_test_artifact(&set, &["v1", "latest"])?;
        assert_eq!(set.get_main()?, Some(blob.digest()), "{structure:?}");

        add_manifest(&set, "other", &["v2"])?;
        assert_eq!(set.get_main()?, None, "{structure:?}");
        set.close()?;
    }
    Ok(())
}

#[test_log::test]
fn test_artifactset_oci_keeps_foreign_oci_tag() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let set = ArtifactSet::create("test", &options(&dir, None, StructureFormat::Oci))?;
    let blob = add_manifest(&set, "foreign", &[])?;

    set.annotate_artifact(&blob.digest(), OCITAG_ANNOTATION, "v0")?;
    assert_eq!(set.get_tags(&blob.digest())?, vec!["v0"]);
    assert!(set.has_artifact("v0")?);

    set.add_tags(&blob.digest(), &["v1"])?;
    assert_eq!(set.get_tags(&blob.digest())?, vec!["v0", "v1"]);
    assert_eq!(set.get_digest("v0")?, Some(blob.digest()));
    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_writes_identical_archives() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let set = ArtifactSet::create("test", &options(&dir, None, StructureFormat::Oci))?;
    add_manifest(&set, "first", &["v1", "latest"])?;
    add_manifest(&set, "second", &["v2"])?;
    set.annotate("owner", "team")?;

    for format in [FileFormat::Tar, FileFormat::Tgz] {
        let write = AccessOptions::builder()
            .file_format(format)
            .path_fs(Arc::new(NativeFileSystem::new(dir.path())))
            .build();
        let first = format!("first{}", format.suffix());
        let second = format!("second{}", format.suffix());
        set.write(&first, &write)?;
        set.write(&second, &write)?;

        let first = std::fs::read(dir.path().join(first))?;
        let second = std::fs::read(dir.path().join(second))?;
        assert!(!first.is_empty());
        assert_eq!(first, second, "{format}");
    }

    set.close()?;
    Ok(())
}

#[test_log::test]
fn test_artifactset_write_and_update_after_close() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let set = ArtifactSet::create("test", &options(&dir, None, StructureFormat::Oci))?;
    add_test_artifact(&set, &["v1"])?;
    set.close()?;

    let write = AccessOptions::builder()
        .file_format(FileFormat::Tgz)
        .path_fs(Arc::new(NativeFileSystem::new(dir.path())))
        .build();
    assert!(set.write("out.tgz", &write).unwrap_err().is_closed());
    assert!(set.update().unwrap_err().is_closed());
    assert!(!dir.path().join("out.tgz").exists());
    Ok(())
}

#[test_log::test]
fn test_artifactset_concurrent_tagging() -> anyhow::Result<()> {
    const WORKERS: usize = 8;

    let dir = tempdir()?;
    let options = options(&dir, None, StructureFormat::Oci);
    let set = ArtifactSet::create("test", &options)?;

    let digests = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let set = &set;
                scope.spawn(move || -> anyhow::Result<_> {
                    let (version, tag) = (format!("v{i}"), format!("t{i}"));
                    let blob = add_manifest(set, &format!("layer-{i}"), &[version.as_str()])?;
                    set.add_tags(&blob.digest(), &["shared", tag.as_str()])?;
                    Ok(blob.digest())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow::anyhow!("tagging thread panicked"))?
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;
    set.close()?;

    let set = ArtifactSet::open(AccessMode::READONLY, "test", &options)?;
    assert_eq!(set.get_index()?.get_manifests().len(), WORKERS * 3);
    for (i, digest) in digests.iter().enumerate() {
        let expected = vec!["shared".to_string(), format!("t{i}"), format!("v{i}")];
        assert_eq!(set.get_tags(digest)?, expected);
    }
    assert_eq!(set.list_tags()?.len(), 2 * WORKERS + 1);
    set.close()?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn options(
    dir: &TempDir,
    format: Option<FileFormat>,
    structure: StructureFormat,
) -> ArtifactSetOptions {
    let access = match format {
        Some(format) => AccessOptions::builder()
            .file_format(format)
            .path_fs(Arc::new(NativeFileSystem::new(dir.path())))
            .build(),
        None => AccessOptions::builder()
            .path_fs(Arc::new(NativeFileSystem::new(dir.path())))
            .build(),
    };
    ArtifactSetOptions::builder()
        .access(access)
        .structure(structure)
        .build()
}

fn add_test_artifact(set: &ArtifactSet, tags: &[&str]) -> anyhow::Result<BlobData> {
    let config = BlobData::for_string(MIME_JSON, "{}")?;
    let layer = BlobData::for_string(MIME_OCTET, "testdata")?;
    set.add_blob(&config)?;
    set.add_blob(&layer)?;
    Ok(set.add_artifact(&Artifact::new_manifest(&config, &[&layer])?, tags)?)
}

fn add_manifest(set: &ArtifactSet, layer: &str, tags: &[&str]) -> anyhow::Result<BlobData> {
    let config = BlobData::for_string(MIME_JSON, "{}")?;
    let layer = BlobData::for_string(MIME_OCTET, layer)?;
    set.add_blob(&config)?;
    set.add_blob(&layer)?;
    Ok(set.add_artifact(&Artifact::new_manifest(&config, &[&layer])?, tags)?)
}

fn tag_map(
    set: &ArtifactSet,
    digests: &[Digest],
) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    digests
        .iter()
        .map(|d| Ok((d.to_string(), set.get_tags(d)?)))
        .collect()
}

fn read_layer(set: &ArtifactSet, reference: &str) -> anyhow::Result<Vec<u8>> {
    let Artifact::Manifest(manifest) = set.get_artifact(reference)? else {
        anyhow::bail!("{reference} is not a manifest");
    };
    let (_, data) = set.get_blob_data(manifest.layers()[0].digest())?;
    Ok(data.get()?)
}

fn archive_entries(path: &Path) -> anyhow::Result<BTreeSet<String>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;

    let reader: Box<dyn Read> = if data.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(&data[..]))
    } else {
        Box::new(&data[..])
    };

    let mut names = BTreeSet::new();
    for entry in tar::Archive::new(reader).entries()? {
        let entry = entry?;
        let name = entry.path()?.to_string_lossy().trim_end_matches('/').to_string();
        names.insert(name);
    }
    Ok(names)
}
