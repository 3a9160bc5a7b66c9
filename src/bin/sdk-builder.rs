use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdk_builder::config::{builder_name_from_env, scrub_sdk_root_env, SDK_ROOT_ENV};
use sdk_builder::release::{write_manifest, ReleaseManifestBuilder};
use sdk_builder::verify::{ExpectedFileList, ManifestVerifier};
use sdk_builder::{
    interrupt, run_pipeline, BuildConfig, BundleError, Platform, SdkDefinition, Toolchain,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_VERIFICATION: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[clap(name = "sdk-builder", about = "Assemble, verify and release SDK bundles", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Log at debug level (RUST_LOG overrides)
    #[clap(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a bundle from an sdk.toml definition
    Build(BuildArgs),
    /// Compare a directory against an expected file list
    Verify(VerifyArgs),
    /// Write a release manifest snippet for an existing archive
    Manifest(ManifestArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Target platform (defaults to the host)
    #[clap(long)]
    platform: Option<Platform>,

    /// Enabled toolchain; repeat for several
    #[clap(long = "toolchain", short = 't')]
    toolchains: Vec<Toolchain>,

    /// Include experimental content
    #[clap(long)]
    experimental: bool,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Bundle definition
    #[clap(long, short, default_value = "sdk.toml")]
    config: PathBuf,

    /// Output directory for the bundle, archive and manifest
    #[clap(long, default_value = "out")]
    out: PathBuf,

    /// Bundle version label
    #[clap(long)]
    release: String,

    /// Source revision recorded in the manifest and README
    #[clap(long, default_value_t = 0)]
    revision: u64,

    #[clap(long, default_value = "x86")]
    arch: String,

    #[clap(flatten)]
    target: TargetArgs,

    /// Skip building the archive
    #[clap(long)]
    skip_archive: bool,

    /// Archive and publish
    #[clap(long)]
    archive: bool,

    /// Reuse toolchain directories already in place
    #[clap(long)]
    skip_toolchain: bool,

    /// Keep an existing bundle directory instead of deleting it first
    #[clap(long)]
    no_clobber: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Expected file list
    file_list: PathBuf,

    /// Directory to check
    dir: PathBuf,

    #[clap(flatten)]
    target: TargetArgs,
}

#[derive(Args, Debug)]
struct ManifestArgs {
    /// Archive to describe
    archive: PathBuf,

    #[clap(long)]
    name: String,

    #[clap(long = "bundle-version")]
    bundle_version: u32,

    #[clap(long)]
    revision: u64,

    #[clap(long)]
    url: String,

    #[clap(long)]
    platform: Option<Platform>,

    /// Output path (defaults to `<archive>.json`)
    #[clap(long)]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BundleError>() {
        Some(e) if e.is_interrupted() => EXIT_INTERRUPTED,
        Some(e) if e.is_verification_failure() => EXIT_VERIFICATION,
        _ => EXIT_FAILURE,
    }
}

fn run(cli: Cli) -> Result<()> {
    interrupt::install_handler().context("installing interrupt handler")?;
    if let Some(previous) = scrub_sdk_root_env() {
        info!(variable = SDK_ROOT_ENV, value = %previous, "ignoring installed SDK root");
    }

    match cli.command {
        Command::Build(args) => build(args),
        Command::Verify(args) => verify(args),
        Command::Manifest(args) => manifest(args),
    }
}

fn build_config(target: &TargetArgs, version: &str, revision: u64) -> BuildConfig {
    let platform = target.platform.unwrap_or_else(Platform::host);
    let mut config = BuildConfig::new(platform, version, revision);
    if !target.toolchains.is_empty() {
        config = config.with_toolchains(target.toolchains.iter().copied());
    }
    config.build_experimental = target.experimental;
    config
}

fn build(args: BuildArgs) -> Result<()> {
    let def = SdkDefinition::load(&args.config)
        .with_context(|| format!("loading bundle definition '{}'", args.config.display()))?;

    let mut config = build_config(&args.target, &args.release, args.revision);
    if args.target.toolchains.is_empty() {
        config = config.with_toolchains(def.toolchains.iter().map(|t| t.toolchain));
    }
    config.arch = args.arch;
    config.skip_archive = args.skip_archive;
    config.archive = args.archive;
    config.skip_toolchain = args.skip_toolchain;
    config.clobber = !args.no_clobber;
    config.apply_builder_identity(builder_name_from_env().as_deref());

    let outcome = run_pipeline(&def, &config, &args.out)
        .with_context(|| format!("building {} bundle for {}", def.name, config.platform))?;

    info!(bundle = %outcome.bundle_dir.display(), "bundle verified");
    if let Some(archive) = &outcome.archive {
        info!(archive = %archive.display(), "archive ready");
    }
    for location in &outcome.published {
        info!(location = %location, "published");
    }
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    // The revision does not take part in verification.
    let config = build_config(&args.target, "0", 0);
    let list = ExpectedFileList::load(&args.file_list)?;
    ManifestVerifier::new(&config).ensure_verified(&args.dir, &list)?;
    println!("{} matches {}", args.dir.display(), args.file_list.display());
    Ok(())
}

fn manifest(args: ManifestArgs) -> Result<()> {
    let platform = args.platform.unwrap_or_else(Platform::host);
    let manifest = ReleaseManifestBuilder::new(platform)
        .build_manifest(&args.name, args.bundle_version, args.revision, &args.archive, &args.url)
        .with_context(|| format!("describing archive '{}'", args.archive.display()))?;

    let out = args.out.unwrap_or_else(|| snippet_path(&args.archive));
    write_manifest(&out, &manifest)
        .with_context(|| format!("writing manifest snippet '{}'", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn snippet_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}
