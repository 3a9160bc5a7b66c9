use crate::assembler::steps::{HookStep, InstallStep, NoticeStep, TextFilesStep, ToolchainStep};
use crate::assembler::AssemblyStep;
use crate::config::file::{SdkDefinition, StepSpec};

/// Population steps for `def`, in execution order: toolchains, text files,
/// the declared install and hook steps as written, then the notice (which
/// must see every license the earlier steps installed).
pub(crate) fn build_steps(def: &SdkDefinition) -> Vec<Box<dyn AssemblyStep>> {
    let mut steps: Vec<Box<dyn AssemblyStep>> = Vec::new();

    steps.push(Box::new(ToolchainStep::new(def.toolchains.clone())));
    if let Some(text) = &def.text {
        steps.push(Box::new(TextFilesStep::new(text.clone())));
    }
    for spec in &def.steps {
        match spec {
            StepSpec::Install(group) => steps.push(Box::new(InstallStep::new(group.clone()))),
            StepSpec::Hook(hook) => steps.push(Box::new(HookStep::new(hook.clone()))),
        }
    }
    steps.push(Box::new(NoticeStep::new(def.notice.clone())));

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn declared_steps_keep_their_order() {
        let def = SdkDefinition::parse(
            r#"
file_list = "files"

[text]
files = ["AUTHORS"]

[[step]]
kind = "install"
name = "headers"
source_root = "src"
files = [{ src = "a.h", dst = "include/" }]

[[step]]
kind = "hook"
name = "libraries"
program = "make"

[[step]]
kind = "install"
name = "tools"
source_root = "out"
files = [{ src = "sel_ldr", dst = "tools/" }]
"#,
            Path::new("sdk.toml"),
        )
        .unwrap();

        let names: Vec<String> = build_steps(&def)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["toolchains", "text", "headers", "libraries", "tools", "notice"]
        );
    }
}
