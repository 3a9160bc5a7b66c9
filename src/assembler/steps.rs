//! The concrete population steps built from an `sdk.toml` definition.

use std::fs;

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::build::licenses::NoticeGenerator;
use crate::build::toolchain::{populate_toolchain, ToolchainSource};
use crate::config::file::{HookSpec, InstallGroup, NoticeSettings, TextFiles};
use crate::config::{BuildConfig, Platform};
use crate::error::{BundleError, IoContext, Result};
use crate::executor::commands::run_command;
use crate::executor::directories::remove_dir_if_exists;
use crate::executor::files::{apply_mappings, write_file};
use crate::install::{resolve, InstallSpec};

use super::{AssemblyStep, StepContext};

/// Exported to hook programs.
pub const BUNDLE_DIR_ENV: &str = "SDK_BUNDLE_DIR";

/// Populates `toolchain/<platform>_<arch>_<name>/` for every enabled toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainStep {
    sources: Vec<ToolchainSource>,
}

impl ToolchainStep {
    pub fn new(sources: Vec<ToolchainSource>) -> Self {
        Self { sources }
    }
}

impl AssemblyStep for ToolchainStep {
    fn name(&self) -> &str {
        "toolchains"
    }

    fn enabled(&self, config: &BuildConfig) -> bool {
        !config.skip_toolchain
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let scratch = ctx.layout.scratch_dir();
        for toolchain in &ctx.config.toolchains {
            crate::interrupt::check()?;
            let source = self
                .sources
                .iter()
                .find(|s| s.toolchain == *toolchain)
                .ok_or_else(|| {
                    BundleError::Config(format!("no source declared for toolchain '{toolchain}'"))
                })?;
            populate_toolchain(source, &ctx.layout.toolchain_dir(*toolchain), &scratch)?;
        }
        remove_dir_if_exists(&scratch)?;
        Ok(())
    }
}

/// Copies top-level text files and renders the README template.
#[derive(Debug, Clone)]
pub struct TextFilesStep {
    text: TextFiles,
}

impl TextFilesStep {
    pub fn new(text: TextFiles) -> Self {
        Self { text }
    }
}

impl AssemblyStep for TextFilesStep {
    fn name(&self) -> &str {
        "text"
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let specs: Vec<InstallSpec> = self.text.files.iter().map(InstallSpec::same).collect();
        let mappings = resolve(&specs, &self.text.source_root, ctx.bundle_dir())?;
        apply_mappings(&mappings)?;

        if let Some(template_path) = &self.text.readme {
            let template = fs::read_to_string(template_path)
                .io_context("reading README template", template_path)?;
            let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
            let readme = render_readme(&template, ctx.config, now)?;
            write_file(&ctx.bundle_dir().join("README"), &readme)?;
        }
        Ok(())
    }
}

/// Fill `${VERSION}`, `${REVISION}` and `${DATE}` in a README template.
/// The date is the builder's local time when the offset is known.
pub fn render_readme(template: &str, config: &BuildConfig, now: OffsetDateTime) -> Result<String> {
    let format = format_description!("[year]/[month]/[day] [hour]:[minute]:[second]");
    let date = now
        .format(&format)
        .map_err(|e| BundleError::Config(format!("formatting README date: {e}")))?;
    Ok(template
        .replace("${VERSION}", &config.version)
        .replace("${REVISION}", &config.revision.to_string())
        .replace("${DATE}", &date))
}

/// Installs one group of files into the bundle.
#[derive(Debug, Clone)]
pub struct InstallStep {
    group: InstallGroup,
}

impl InstallStep {
    pub fn new(group: InstallGroup) -> Self {
        Self { group }
    }

    /// The group's specs as they apply on `platform`.
    pub fn specs_for(&self, platform: Platform) -> Vec<InstallSpec> {
        if !self.group.exe_suffix {
            return self.group.files.clone();
        }
        self.group
            .files
            .iter()
            .map(|spec| {
                let dest = if spec.dest_is_dir() {
                    spec.dest_pattern.clone()
                } else {
                    exe_name(&spec.dest_pattern, platform)
                };
                InstallSpec::new(exe_name(&spec.source_pattern, platform), dest)
            })
            .collect()
    }
}

impl AssemblyStep for InstallStep {
    fn name(&self) -> &str {
        &self.group.name
    }

    fn enabled(&self, config: &BuildConfig) -> bool {
        self.group.when.eval(config)
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let specs = self.specs_for(ctx.config.platform);
        let dest_root = ctx.bundle_dir().join(&self.group.dest);
        let mappings = resolve(&specs, &self.group.source_root, &dest_root)?;
        let copied = apply_mappings(&mappings)?;
        info!(step = %self.group.name, files = copied, "installed");
        Ok(())
    }
}

/// Windows executables carry `.exe`; native client modules (`.nexe`) do not.
pub fn exe_name(name: &str, platform: Platform) -> String {
    if platform == Platform::Win && !name.ends_with(".nexe") && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Runs an external program against the bundle.
#[derive(Debug, Clone)]
pub struct HookStep {
    hook: HookSpec,
}

impl HookStep {
    pub fn new(hook: HookSpec) -> Self {
        Self { hook }
    }
}

impl AssemblyStep for HookStep {
    fn name(&self) -> &str {
        &self.hook.name
    }

    fn enabled(&self, config: &BuildConfig) -> bool {
        self.hook.when.eval(config)
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let args: Vec<String> = self.hook.args.iter().map(|a| ctx.config.expand(a)).collect();
        run_command(
            &self.hook.program,
            &args,
            &self.hook.cwd,
            &[(BUNDLE_DIR_ENV, ctx.bundle_dir())],
        )
    }
}

/// Writes the aggregated license notice.
#[derive(Debug, Clone)]
pub struct NoticeStep {
    settings: NoticeSettings,
}

impl NoticeStep {
    pub fn new(settings: NoticeSettings) -> Self {
        Self { settings }
    }
}

impl AssemblyStep for NoticeStep {
    fn name(&self) -> &str {
        "notice"
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        NoticeGenerator::new()
            .with_extra_files(self.settings.extra_files.iter().cloned())
            .generate(ctx.bundle_dir(), &self.settings.output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BundleLayout;
    use crate::config::Toolchain;
    use crate::verify::Predicate;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use time::macros::datetime;

    fn fixture(temp: &TempDir, config: &BuildConfig) -> BundleLayout {
        let layout = BundleLayout::new(&temp.path().join("out"), "sdk", config).unwrap();
        fs::create_dir_all(&layout.bundle_dir).unwrap();
        layout
    }

    fn group(name: &str, source_root: &Path, dest: &str, files: Vec<InstallSpec>) -> InstallGroup {
        InstallGroup {
            name: name.into(),
            source_root: source_root.to_path_buf(),
            dest: dest.into(),
            when: Predicate::always(),
            exe_suffix: false,
            files,
        }
    }

    #[test]
    fn readme_placeholders_are_rendered() {
        let config = BuildConfig::new(Platform::Linux, "27", 190123);
        let rendered = render_readme(
            "Version: ${VERSION}\nRevision: ${REVISION}\nDate: ${DATE}\n",
            &config,
            datetime!(2013-04-05 06:07:08 UTC),
        )
        .unwrap();
        assert_eq!(
            rendered,
            "Version: 27\nRevision: 190123\nDate: 2013/04/05 06:07:08\n"
        );
    }

    #[test]
    fn exe_suffix_only_on_windows_and_not_for_nexe() {
        assert_eq!(exe_name("sel_ldr", Platform::Win), "sel_ldr.exe");
        assert_eq!(exe_name("irt_core.nexe", Platform::Win), "irt_core.nexe");
        assert_eq!(exe_name("sel_ldr.exe", Platform::Win), "sel_ldr.exe");
        assert_eq!(exe_name("sel_ldr", Platform::Linux), "sel_ldr");
    }

    #[test]
    fn install_step_applies_exe_suffix_to_files_not_directories() {
        let mut g = group(
            "tools",
            Path::new("/src"),
            "tools",
            vec![InstallSpec::new("sel_ldr", "bin/"), InstallSpec::new("ncval", "ncval")],
        );
        g.exe_suffix = true;
        let specs = InstallStep::new(g).specs_for(Platform::Win);
        assert_eq!(
            specs,
            vec![
                InstallSpec::new("sel_ldr.exe", "bin/"),
                InstallSpec::new("ncval.exe", "ncval.exe"),
            ]
        );
    }

    #[test]
    fn install_step_copies_into_group_destination() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::new(Platform::Linux, "27", 1);
        let layout = fixture(&temp, &config);
        let src = temp.path().join("ppapi");
        fs::create_dir_all(src.join("c")).unwrap();
        fs::write(src.join("c/pp_errors.h"), "h").unwrap();
        fs::write(src.join("c/pp_var.h"), "h").unwrap();

        let step = InstallStep::new(group(
            "headers",
            &src,
            "include/ppapi",
            vec![InstallSpec::new("c/*.h", "c/")],
        ));
        step.run(&StepContext { config: &config, layout: &layout }).unwrap();

        assert!(layout.bundle_dir.join("include/ppapi/c/pp_errors.h").is_file());
        assert!(layout.bundle_dir.join("include/ppapi/c/pp_var.h").is_file());
    }

    #[test]
    fn install_step_is_gated_by_condition() {
        let mut g = group("glibc_libs", Path::new("/src"), "lib", vec![]);
        g.when = Predicate::parse("glibc").unwrap();
        let step = InstallStep::new(g);

        let newlib =
            BuildConfig::new(Platform::Linux, "27", 1).with_toolchains([Toolchain::Newlib]);
        assert!(!step.enabled(&newlib));
        assert!(step.enabled(&BuildConfig::new(Platform::Linux, "27", 1)));
    }

    #[test]
    fn toolchain_step_requires_a_source_for_each_enabled_toolchain() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::new(Platform::Linux, "27", 1)
            .with_toolchains([Toolchain::Newlib, Toolchain::Glibc]);
        let layout = fixture(&temp, &config);
        let prebuilt = temp.path().join("newlib");
        fs::create_dir_all(prebuilt.join("bin")).unwrap();
        fs::write(prebuilt.join("bin/gcc"), "gcc").unwrap();

        let step = ToolchainStep::new(vec![ToolchainSource {
            toolchain: Toolchain::Newlib,
            source: prebuilt,
            strip_prefix: None,
        }]);
        let err = step
            .run(&StepContext { config: &config, layout: &layout })
            .unwrap_err();

        assert!(err.to_string().contains("glibc"));
        assert!(layout.toolchain_dir(Toolchain::Newlib).join("bin/gcc").is_file());
    }

    #[test]
    fn toolchain_step_honours_skip_flag() {
        let mut config = BuildConfig::new(Platform::Linux, "27", 1);
        assert!(ToolchainStep::new(vec![]).enabled(&config));
        config.skip_toolchain = true;
        assert!(!ToolchainStep::new(vec![]).enabled(&config));
    }

    #[test]
    fn hook_sees_bundle_dir_and_expanded_args() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::new(Platform::Mac, "27", 1);
        let layout = fixture(&temp, &config);

        let step = HookStep::new(HookSpec {
            name: "stamp".into(),
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo \"$1\" > \"$SDK_BUNDLE_DIR/tools/stamp\"".into(),
                "stamp".into(),
                "${PLATFORM}".into(),
            ],
            cwd: temp.path().to_path_buf(),
            when: Predicate::always(),
        });
        fs::create_dir_all(layout.bundle_dir.join("tools")).unwrap();
        step.run(&StepContext { config: &config, layout: &layout }).unwrap();

        let stamp = fs::read_to_string(layout.bundle_dir.join("tools/stamp")).unwrap();
        assert_eq!(stamp.trim(), "mac");
    }

    #[test]
    fn failing_hook_is_an_external_tool_failure() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::new(Platform::Linux, "27", 1);
        let layout = fixture(&temp, &config);
        let step = HookStep::new(HookSpec {
            name: "broken".into(),
            program: "sh".into(),
            args: vec!["-c".into(), "echo nope >&2; exit 3".into()],
            cwd: PathBuf::from("."),
            when: Predicate::always(),
        });

        let err = step
            .run(&StepContext { config: &config, layout: &layout })
            .unwrap_err();
        match err {
            BundleError::ExternalToolFailure { program, output, .. } => {
                assert_eq!(program, "sh");
                assert!(output.contains("nope"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_step_copies_files_and_renders_readme() {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::new(Platform::Linux, "28", 7);
        let layout = fixture(&temp, &config);
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("AUTHORS"), "people").unwrap();
        fs::write(src.join("README.in"), "SDK ${VERSION} r${REVISION}\n").unwrap();

        let step = TextFilesStep::new(TextFiles {
            source_root: src.clone(),
            files: vec!["AUTHORS".into()],
            readme: Some(src.join("README.in")),
        });
        step.run(&StepContext { config: &config, layout: &layout }).unwrap();

        assert_eq!(fs::read_to_string(layout.bundle_dir.join("AUTHORS")).unwrap(), "people");
        assert_eq!(
            fs::read_to_string(layout.bundle_dir.join("README")).unwrap(),
            "SDK 28 r7\n"
        );
    }
}
