use crate::core::command::ProcessStep;
use crate::core::error::ConfigError;

const DISABLED: &str = "none";

/// External program that maps a source file name to an output file name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilenamePlugin {
    #[default]
    Disabled,
    Command { program: String, args: Vec<String> },
}

impl FilenamePlugin {
    pub fn parse(command: Option<&str>) -> Result<Self, ConfigError> {
        let Some(command) = command.map(str::trim) else {
            return Ok(FilenamePlugin::Disabled);
        };
        if command.is_empty() || command == DISABLED {
            return Ok(FilenamePlugin::Disabled);
        }
        let mut words = shell_words::split(command)
            .map_err(|e| ConfigError::Settings {
                message: format!("filename_plugin: {e}"),
            })?
            .into_iter();
        match words.next() {
            Some(program) => Ok(FilenamePlugin::Command {
                program,
                args: words.collect(),
            }),
            None => Ok(FilenamePlugin::Disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, FilenamePlugin::Command { .. })
    }

    /// The plugin invocation for one source file name, or `None` when
    /// disabled and the source name is kept.
    pub fn step(&self, source_name: &str) -> Option<ProcessStep> {
        match self {
            FilenamePlugin::Disabled => None,
            FilenamePlugin::Command { program, args } => {
                let mut arguments = args.clone();
                arguments.push(source_name.to_string());
                Some(ProcessStep::new(program.clone(), arguments))
            }
        }
    }
}

/// The output file name printed by a plugin.
pub fn output_name(stdout: &str) -> Option<String> {
    let name = stdout.trim();
    (!name.is_empty()).then(|| name.to_string())
}
