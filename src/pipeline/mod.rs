//! End-to-end bundle build.
//!
//! Everything that can be rejected without touching the output directory
//! (option conflicts, missing hook programs, an unreadable file list) is
//! checked before the assembler takes its lock.

mod plan;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::assembler::DirectoryAssembler;
use crate::build::context::BundleLayout;
use crate::config::file::SdkDefinition;
use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::preflight;
use crate::release::archive::TarZstArchiver;
use crate::release::publish::DirectoryPublisher;
use crate::release::{write_manifest, BundleManifest, ReleaseManifestBuilder};
use crate::verify::ExpectedFileList;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub bundle_dir: PathBuf,
    pub archive: Option<PathBuf>,
    pub manifest: Option<BundleManifest>,
    /// Locations of published files; empty unless publication was requested.
    pub published: Vec<String>,
}

/// Assemble, verify, archive and optionally publish the bundle described by
/// `def` under `out_dir`.
pub fn run_pipeline(
    def: &SdkDefinition,
    config: &BuildConfig,
    out_dir: &Path,
) -> Result<PipelineOutcome> {
    config.validate()?;
    if config.archive && def.publish.is_none() {
        return Err(BundleError::Config(format!(
            "publication requested but '{}' has no [publish] section",
            def.path.display()
        )));
    }
    preflight::check_hooks(def.hooks(), config)?;
    let file_list = ExpectedFileList::load(&def.file_list)?;
    let layout = BundleLayout::new(out_dir, &def.name, config)?;

    info!(
        bundle = %layout.bundle_name,
        platform = %config.platform,
        toolchains = ?config.toolchains,
        revision = config.revision,
        "building bundle"
    );

    let steps = plan::build_steps(def);
    let mut assembler = DirectoryAssembler::new(config, layout.clone());
    assembler.scaffold()?;
    assembler.populate(&steps)?;
    assembler.verify(&file_list)?;

    let mut outcome = PipelineOutcome {
        bundle_dir: layout.bundle_dir.clone(),
        archive: None,
        manifest: None,
        published: Vec::new(),
    };
    if config.skip_archive {
        info!("skipping archive");
        return Ok(outcome);
    }

    let archive = assembler.archive(&TarZstArchiver::default())?;
    let archive_name = layout.archive_name();
    let published_name = format!("{}/{archive_name}", config.revision);
    let url = match &def.publish {
        Some(publish) => format!("{}/{published_name}", publish.base_url),
        None => archive_name.clone(),
    };

    let mut builder = ReleaseManifestBuilder::new(config.platform)
        .stability(def.stability)
        .recommended(def.recommended);
    if let Some(description) = &def.description {
        builder = builder.description(description.clone());
    }
    let manifest = builder.build_manifest(
        &layout.bundle_name,
        config.numeric_version()?,
        config.revision,
        &archive,
        &url,
    )?;
    let snippet = layout.manifest_snippet_path();
    write_manifest(&snippet, &manifest)?;
    info!(manifest = %snippet.display(), "wrote manifest snippet");

    if let (true, Some(publish)) = (config.archive, &def.publish) {
        let publisher = DirectoryPublisher::new(&publish.bucket_dir);
        outcome.published = assembler.publish(
            &publisher,
            &[
                (archive.clone(), published_name.clone()),
                (snippet, format!("{published_name}.json")),
            ],
        )?;
    }

    outcome.archive = Some(archive);
    outcome.manifest = Some(manifest);
    Ok(outcome)
}
