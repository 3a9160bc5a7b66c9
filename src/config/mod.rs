//! Build configuration.
//!
//! [`BuildConfig`] is constructed once per run and passed by reference to
//! every component that needs it. Nothing in the crate reads process-wide
//! option state.

pub mod file;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Builder identity; when set the run archives and publishes by default.
pub const BUILDER_NAME_ENV: &str = "BUILDBOT_BUILDERNAME";

/// Installed-SDK root. Ignored (and scrubbed) for the duration of a build.
pub const SDK_ROOT_ENV: &str = "SDK_ROOT";

/// Host platform a bundle is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Mac,
    Win,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Linux, Platform::Mac, Platform::Win];

    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(windows) {
            Platform::Win
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Win => "win",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "mac" => Ok(Platform::Mac),
            "win" => Ok(Platform::Win),
            other => Err(BundleError::Config(format!(
                "unknown platform '{other}' (expected linux, mac or win)"
            ))),
        }
    }
}

/// Toolchain flavours a bundle can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
    Newlib,
    Glibc,
    Arm,
    Pnacl,
    Host,
}

impl Toolchain {
    pub const ALL: [Toolchain; 5] = [
        Toolchain::Newlib,
        Toolchain::Glibc,
        Toolchain::Arm,
        Toolchain::Pnacl,
        Toolchain::Host,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Toolchain::Newlib => "newlib",
            Toolchain::Glibc => "glibc",
            Toolchain::Arm => "arm",
            Toolchain::Pnacl => "pnacl",
            Toolchain::Host => "host",
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Toolchain {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newlib" => Ok(Toolchain::Newlib),
            "glibc" => Ok(Toolchain::Glibc),
            "arm" => Ok(Toolchain::Arm),
            "pnacl" => Ok(Toolchain::Pnacl),
            "host" => Ok(Toolchain::Host),
            other => Err(BundleError::Config(format!("unknown toolchain '{other}'"))),
        }
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub platform: Platform,
    pub arch: String,
    /// Enabled toolchains, in declaration order, without duplicates.
    pub toolchains: Vec<Toolchain>,
    /// Bundle version label; must be numeric.
    pub version: String,
    pub revision: u64,
    pub build_experimental: bool,
    pub skip_toolchain: bool,
    pub skip_archive: bool,
    /// Force archiving and publication.
    pub archive: bool,
    pub clobber: bool,
}

impl BuildConfig {
    /// Defaults: every toolchain, x86, clobber, archive but do not publish.
    pub fn new(platform: Platform, version: impl Into<String>, revision: u64) -> Self {
        Self {
            platform,
            arch: "x86".to_string(),
            toolchains: Toolchain::ALL.to_vec(),
            version: version.into(),
            revision,
            build_experimental: false,
            skip_toolchain: false,
            skip_archive: false,
            archive: false,
            clobber: true,
        }
    }

    /// Replace the toolchain set, dropping duplicates but keeping order.
    pub fn with_toolchains(mut self, toolchains: impl IntoIterator<Item = Toolchain>) -> Self {
        let mut out = Vec::new();
        for tc in toolchains {
            if !out.contains(&tc) {
                out.push(tc);
            }
        }
        self.toolchains = out;
        self
    }

    pub fn has_toolchain(&self, toolchain: Toolchain) -> bool {
        self.toolchains.contains(&toolchain)
    }

    /// Numeric bundle version, as written into the release manifest.
    pub fn numeric_version(&self) -> Result<u32> {
        self.version.trim().parse::<u32>().map_err(|_| {
            BundleError::Config(format!(
                "version '{}' must be an unsigned integer",
                self.version
            ))
        })
    }

    /// Reject option combinations that cannot be honoured.
    pub fn validate(&self) -> Result<()> {
        if self.archive && self.skip_archive {
            return Err(BundleError::Config(
                "incompatible arguments: archive requested while archiving is skipped".into(),
            ));
        }
        if self.arch.trim().is_empty() {
            return Err(BundleError::Config("arch must not be empty".into()));
        }
        self.numeric_version()?;
        Ok(())
    }

    /// Turn on publication when running under a named builder.
    pub fn apply_builder_identity(&mut self, builder_name: Option<&str>) {
        if builder_name.is_some_and(|name| !name.trim().is_empty()) {
            self.archive = true;
        }
    }

    /// Substitute `${PLATFORM}`, `${ARCH}`, `${VERSION}` and `${REVISION}`.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("${PLATFORM}", self.platform.as_str())
            .replace("${ARCH}", &self.arch)
            .replace("${VERSION}", &self.version)
            .replace("${REVISION}", &self.revision.to_string())
    }
}

/// Read the builder identity variable.
pub fn builder_name_from_env() -> Option<String> {
    std::env::var(BUILDER_NAME_ENV).ok()
}

/// Drop any pre-existing installed-SDK root so it cannot leak into the build.
///
/// Returns the value that was removed, if any.
pub fn scrub_sdk_root_env() -> Option<String> {
    let previous = std::env::var(SDK_ROOT_ENV).ok();
    if previous.is_some() {
        std::env::remove_var(SDK_ROOT_ENV);
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_everything_without_publishing() {
        let config = BuildConfig::new(Platform::Linux, "27", 1000);
        assert_eq!(config.toolchains.len(), Toolchain::ALL.len());
        assert!(config.clobber);
        assert!(!config.archive);
        assert!(!config.skip_archive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn archive_and_skip_archive_conflict() {
        let mut config = BuildConfig::new(Platform::Linux, "27", 1);
        config.archive = true;
        config.skip_archive = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_numeric_version_rejected() {
        let config = BuildConfig::new(Platform::Mac, "canary", 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_identity_turns_on_archive() {
        let mut config = BuildConfig::new(Platform::Linux, "27", 1);
        config.apply_builder_identity(Some(""));
        assert!(!config.archive);
        config.apply_builder_identity(Some("linux-sdk-multi"));
        assert!(config.archive);
    }

    #[test]
    fn toolchains_are_deduplicated_in_order() {
        let config = BuildConfig::new(Platform::Linux, "27", 1).with_toolchains([
            Toolchain::Glibc,
            Toolchain::Newlib,
            Toolchain::Glibc,
        ]);
        assert_eq!(config.toolchains, vec![Toolchain::Glibc, Toolchain::Newlib]);
    }

    #[test]
    fn expand_substitutes_known_variables() {
        let config = BuildConfig::new(Platform::Win, "28", 42);
        assert_eq!(
            config.expand("toolchain/${PLATFORM}_${ARCH}_newlib/${VERSION}-r${REVISION}"),
            "toolchain/win_x86_newlib/28-r42"
        );
    }

    #[test]
    fn platform_and_toolchain_parse_case_insensitively() {
        assert_eq!("Linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!(" PNACL ".parse::<Toolchain>().unwrap(), Toolchain::Pnacl);
        assert!("beos".parse::<Platform>().is_err());
    }
}
