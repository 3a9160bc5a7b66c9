//! Loader for the `sdk.toml` bundle definition.
//!
//! ```toml
//! name = "pepper"
//! file_list = "sdk_files.list"
//!
//! [text]
//! source_root = "../.."
//! files = ["AUTHORS", "COPYING", "LICENSE"]
//! readme = "README.in"
//!
//! [[toolchain]]
//! name = "newlib"
//! source = "prebuilt/newlib.tar.zst"
//! strip_prefix = "sdk/nacl-sdk"
//!
//! [[step]]
//! kind = "install"
//! name = "headers"
//! source_root = "ppapi"
//! dest = "include/ppapi"
//! files = [{ src = "c/*.h", dst = "c/" }]
//!
//! [[step]]
//! kind = "hook"
//! name = "libraries"
//! program = "make"
//! args = ["-C", "lib", "PLATFORM=${PLATFORM}"]
//!
//! [[step]]
//! kind = "install"
//! name = "tools"
//! source_root = "out/Release"
//! dest = "tools"
//! exe_suffix = true
//! files = [{ src = "sel_ldr_x86_32", dst = "sel_ldr_x86_32" }, { src = "ncval" }]
//! ```
//!
//! `[[step]]` entries run in the order they are written, so a hook can
//! build against files an earlier install step placed. Relative paths are
//! resolved against the directory holding the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::build::licenses::DEFAULT_NOTICE_NAME;
use crate::build::toolchain::ToolchainSource;
use crate::config::Toolchain;
use crate::error::{BundleError, IoContext, Result};
use crate::install::InstallSpec;
use crate::release::Stability;
use crate::verify::Predicate;

pub const DEFAULT_BUNDLE_NAME: &str = "sdk";

/// Fully resolved bundle definition.
#[derive(Debug, Clone)]
pub struct SdkDefinition {
    /// The file this definition was read from.
    pub path: PathBuf,
    /// Bundle name prefix (`<name>_<version>`).
    pub name: String,
    pub description: Option<String>,
    pub stability: Stability,
    pub recommended: bool,
    pub file_list: PathBuf,
    pub text: Option<TextFiles>,
    pub toolchains: Vec<ToolchainSource>,
    /// Install groups and hooks, in declared order.
    pub steps: Vec<StepSpec>,
    pub notice: NoticeSettings,
    pub publish: Option<PublishSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFiles {
    pub source_root: PathBuf,
    /// Copied verbatim into the bundle root.
    pub files: Vec<String>,
    /// Template rendered to `README`.
    pub readme: Option<PathBuf>,
}

/// One declared `[[step]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSpec {
    Install(InstallGroup),
    Hook(HookSpec),
}

impl StepSpec {
    pub fn name(&self) -> &str {
        match self {
            StepSpec::Install(group) => &group.name,
            StepSpec::Hook(hook) => &hook.name,
        }
    }
}

/// A named install step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallGroup {
    pub name: String,
    pub source_root: PathBuf,
    /// Destination relative to the bundle dir.
    pub dest: String,
    pub when: Predicate,
    /// Append `.exe` to sources and destinations when building for Windows.
    pub exe_suffix: bool,
    pub files: Vec<InstallSpec>,
}

/// External command run as an assembly step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub when: Predicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeSettings {
    /// Relative to the bundle dir.
    pub extra_files: Vec<PathBuf>,
    pub output: PathBuf,
}

impl Default for NoticeSettings {
    fn default() -> Self {
        Self {
            extra_files: Vec::new(),
            output: PathBuf::from(DEFAULT_NOTICE_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    pub bucket_dir: PathBuf,
    /// Public URL of `bucket_dir`; archive URLs are `<base_url>/<revision>/<archive>`.
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SdkToml {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    stability: Stability,
    #[serde(default)]
    recommended: bool,
    file_list: String,
    text: Option<TextToml>,
    #[serde(default)]
    toolchain: Vec<ToolchainToml>,
    #[serde(default)]
    step: Vec<StepToml>,
    notice: Option<NoticeToml>,
    publish: Option<PublishToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TextToml {
    source_root: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    readme: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolchainToml {
    name: Toolchain,
    source: String,
    strip_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum StepToml {
    Install(InstallToml),
    Hook(HookToml),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallToml {
    name: String,
    source_root: String,
    #[serde(default)]
    dest: String,
    when: Option<String>,
    #[serde(default)]
    exe_suffix: bool,
    files: Vec<InstallSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HookToml {
    name: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
    cwd: Option<String>,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoticeToml {
    #[serde(default)]
    extra_files: Vec<String>,
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublishToml {
    bucket_dir: String,
    base_url: String,
}

pub(crate) fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

impl SdkDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).io_context("reading bundle definition", path)?;
        Self::parse(&text, path)
    }

    /// Parse `text` as if it had been read from `path`.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let invalid = |message: String| {
            BundleError::Config(format!("'{}': {message}", path.display()))
        };
        let parsed: SdkToml = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let name = parsed
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.to_string());
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(invalid(format!("name '{name}' must be a plain file name")));
        }

        let when = |raw: Option<String>, owner: &str| -> Result<Predicate> {
            match raw {
                Some(raw) => Predicate::parse(&raw)
                    .map_err(|e| invalid(format!("{owner}: {e}"))),
                None => Ok(Predicate::always()),
            }
        };

        let text = parsed.text.map(|t| TextFiles {
            source_root: resolve_path(base, t.source_root.as_deref().unwrap_or(".")),
            files: t.files,
            readme: t.readme.map(|r| resolve_path(base, &r)),
        });

        let mut toolchains: Vec<ToolchainSource> = Vec::new();
        for tc in parsed.toolchain {
            if toolchains.iter().any(|t| t.toolchain == tc.name) {
                return Err(invalid(format!("toolchain '{}' declared twice", tc.name)));
            }
            toolchains.push(ToolchainSource {
                toolchain: tc.name,
                source: resolve_path(base, &tc.source),
                strip_prefix: tc.strip_prefix.map(PathBuf::from),
            });
        }

        let mut steps: Vec<StepSpec> = Vec::new();
        for raw in parsed.step {
            let step = match raw {
                StepToml::Install(group) => {
                    let name = group.name.trim().to_string();
                    StepSpec::Install(InstallGroup {
                        when: when(group.when, &format!("step '{name}'"))?,
                        name,
                        source_root: resolve_path(base, &group.source_root),
                        dest: group.dest,
                        exe_suffix: group.exe_suffix,
                        files: group.files,
                    })
                }
                StepToml::Hook(hook) => {
                    let name = hook.name.trim().to_string();
                    StepSpec::Hook(HookSpec {
                        when: when(hook.when, &format!("step '{name}'"))?,
                        cwd: resolve_path(base, hook.cwd.as_deref().unwrap_or(".")),
                        name,
                        program: hook.program,
                        args: hook.args,
                    })
                }
            };
            let name = step.name();
            if name.is_empty() {
                return Err(invalid("step name must not be empty".into()));
            }
            if steps.iter().any(|s| s.name() == name) {
                return Err(invalid(format!("step '{name}' declared twice")));
            }
            steps.push(step);
        }

        let notice = match parsed.notice {
            Some(n) => NoticeSettings {
                extra_files: n.extra_files.into_iter().map(PathBuf::from).collect(),
                output: PathBuf::from(n.output.unwrap_or_else(|| DEFAULT_NOTICE_NAME.into())),
            },
            None => NoticeSettings::default(),
        };

        let publish = parsed.publish.map(|p| PublishSettings {
            bucket_dir: resolve_path(base, &p.bucket_dir),
            base_url: p.base_url.trim_end_matches('/').to_string(),
        });

        Ok(Self {
            path: path.to_path_buf(),
            name,
            description: parsed.description,
            stability: parsed.stability,
            recommended: parsed.recommended,
            file_list: resolve_path(base, &parsed.file_list),
            text,
            toolchains,
            steps,
            notice,
            publish,
        })
    }

    /// Declared hooks, in order.
    pub fn hooks(&self) -> impl Iterator<Item = &HookSpec> {
        self.steps.iter().filter_map(|step| match step {
            StepSpec::Hook(hook) => Some(hook),
            StepSpec::Install(_) => None,
        })
    }
}
