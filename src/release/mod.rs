//! Release descriptors for finished archives.
//!
//! [`ReleaseManifestBuilder`] hashes an archive in one streaming pass and
//! wraps the result in a [`BundleManifest`], the field-named JSON document a
//! package index merges into its catalog.

pub mod archive;
pub mod publish;

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::Platform;
use crate::error::{BundleError, IoContext, Result};

/// Stability channel of a bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    #[default]
    Dev,
    Beta,
    Stable,
}

/// One platform-specific downloadable artefact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub platform: Platform,
    pub url: String,
    pub size: u64,
    /// Lowercase hex sha256 of the archive bytes.
    pub checksum: String,
}

/// Release descriptor for one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    pub revision: u64,
    pub repath: String,
    pub version: u32,
    pub description: String,
    pub stability: Stability,
    pub recommended: bool,
    pub archives: Vec<Archive>,
}

/// Digest and byte count of everything `reader` yields.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

pub fn hash_file(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path).io_context("opening archive", path)?;
    hash_reader(BufReader::new(file)).io_context("hashing archive", path)
}

/// Builds [`BundleManifest`]s for a platform.
#[derive(Debug, Clone)]
pub struct ReleaseManifestBuilder {
    platform: Platform,
    stability: Stability,
    recommended: bool,
    description: Option<String>,
}

impl ReleaseManifestBuilder {
    /// New bundles start in the dev channel and are not recommended.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            stability: Stability::Dev,
            recommended: false,
            description: None,
        }
    }

    pub fn stability(mut self, stability: Stability) -> Self {
        self.stability = stability;
        self
    }

    pub fn recommended(mut self, recommended: bool) -> Self {
        self.recommended = recommended;
        self
    }

    /// Override the default description. `${VERSION}` and `${REVISION}` are
    /// substituted.
    pub fn description(mut self, template: impl Into<String>) -> Self {
        self.description = Some(template.into());
        self
    }

    pub fn build_manifest(
        &self,
        bundle_name: &str,
        version: u32,
        revision: u64,
        artifact: &Path,
        url: &str,
    ) -> Result<BundleManifest> {
        let (checksum, size) = hash_file(artifact)?;
        let description = match &self.description {
            Some(template) => template
                .replace("${VERSION}", &version.to_string())
                .replace("${REVISION}", &revision.to_string()),
            None => format!("SDK {version} bundle, revision {revision}"),
        };

        info!(
            archive = %artifact.display(),
            size,
            checksum = %checksum,
            "computed archive checksum"
        );

        Ok(BundleManifest {
            name: bundle_name.to_string(),
            revision,
            repath: bundle_name.to_string(),
            version,
            description,
            stability: self.stability,
            recommended: self.recommended,
            archives: vec![Archive {
                platform: self.platform,
                url: url.to_string(),
                size,
                checksum,
            }],
        })
    }
}

/// Serialize `manifest` to `path` via a temp file and rename.
pub fn write_manifest(path: &Path, manifest: &BundleManifest) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        BundleError::Config(format!("manifest path without parent '{}'", path.display()))
    })?;
    fs::create_dir_all(parent).io_context("creating manifest directory", parent)?;

    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let mut payload = serde_json::to_vec_pretty(manifest)
        .map_err(|e| BundleError::Config(format!("serializing manifest: {e}")))?;
    payload.push(b'\n');
    fs::write(&tmp, payload).io_context("writing manifest", &tmp)?;
    fs::rename(&tmp, path).io_context("moving manifest into place", path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_digest_and_size() {
        let (sum, size) = hash_reader(&b"abc"[..]).unwrap();
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(size, 3);
    }

    #[test]
    fn checksum_is_stable_and_sensitive_to_one_byte() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.tar.zst");
        let b = temp.path().join("b.tar.zst");
        let mut bytes = vec![7u8; 4096];
        fs::write(&a, &bytes).unwrap();
        fs::write(&b, &bytes).unwrap();

        let builder = ReleaseManifestBuilder::new(Platform::Linux);
        let one = builder.build_manifest("sdk_27", 27, 5, &a, "u").unwrap();
        let two = builder.build_manifest("sdk_27", 27, 5, &b, "u").unwrap();
        assert_eq!(one.archives[0].checksum, two.archives[0].checksum);
        assert_eq!(one.archives[0].size, 4096);

        bytes[100] ^= 1;
        fs::write(&b, &bytes).unwrap();
        let flipped = builder.build_manifest("sdk_27", 27, 5, &b, "u").unwrap();
        assert_ne!(one.archives[0].checksum, flipped.archives[0].checksum);
        assert_eq!(flipped.archives[0].size, 4096);
    }

    #[test]
    fn manifest_serializes_with_named_fields() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("sdk_mac.tar.zst");
        fs::write(&artifact, "payload").unwrap();

        let manifest = ReleaseManifestBuilder::new(Platform::Mac)
            .build_manifest(
                "sdk_28",
                28,
                190000,
                &artifact,
                "https://example.invalid/190000/sdk_mac.tar.zst",
            )
            .unwrap();
        let out = temp.path().join("sdk_mac.tar.zst.json");
        write_manifest(&out, &manifest).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["name"], "sdk_28");
        assert_eq!(value["repath"], "sdk_28");
        assert_eq!(value["version"], 28);
        assert_eq!(value["revision"], 190000);
        assert_eq!(value["stability"], "dev");
        assert_eq!(value["recommended"], false);
        assert_eq!(value["description"], "SDK 28 bundle, revision 190000");
        assert_eq!(value["archives"][0]["platform"], "mac");
        assert_eq!(value["archives"][0]["size"], 7);

        let parsed: BundleManifest =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn description_template_and_channel_overrides() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("x");
        fs::write(&artifact, "x").unwrap();

        let manifest = ReleaseManifestBuilder::new(Platform::Win)
            .stability(Stability::Beta)
            .recommended(true)
            .description("Pepper ${VERSION} (r${REVISION})")
            .build_manifest("pepper_30", 30, 9, &artifact, "u")
            .unwrap();
        assert_eq!(manifest.description, "Pepper 30 (r9)");
        assert_eq!(manifest.stability, Stability::Beta);
        assert!(manifest.recommended);
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let err = ReleaseManifestBuilder::new(Platform::Linux)
            .build_manifest("sdk_1", 1, 1, Path::new("/nonexistent/a.tar.zst"), "u")
            .unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
    }
}
