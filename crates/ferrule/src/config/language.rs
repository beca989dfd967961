use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::{ResourceLimits, Stage};

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Class name used when a public-class language declares no public class
pub const DEFAULT_CLASS_NAME: &str = "Main";

static PUBLIC_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"public\s+class\s+(\w+)").expect("static regex is valid"));

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ (GCC)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// How the source file inside the workspace is named
    #[serde(default)]
    pub source: SourceNaming,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Get the source file name for the given submission
    pub fn source_name(&self, code: &str) -> String {
        match &self.source {
            SourceNaming::Main => format!("main.{}", self.extension),
            SourceNaming::Fixed { name } => name.clone(),
            SourceNaming::PublicClass { default } => {
                let class = public_class_name(code).unwrap_or(default);
                format!("{class}.{}", self.extension)
            }
        }
    }

    /// Build the placeholder values for a source file written into `workdir`
    pub fn placeholders(&self, workdir: &Path, source_name: &str) -> Placeholders {
        let class = Path::new(source_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let binary_name = self
            .compile
            .as_ref()
            .and_then(|compile| compile.output_name.clone())
            .unwrap_or_else(|| class.clone());

        Placeholders {
            source: workdir.join(source_name),
            binary: workdir.join(binary_name),
            class,
            workdir: workdir.to_path_buf(),
        }
    }

    /// Toolchain description for the program a stage launches
    pub fn toolchain(&self, stage: Stage, program: &str) -> Toolchain {
        let configured = match stage {
            Stage::Compile => self
                .compile
                .as_ref()
                .and_then(|compile| compile.toolchain.clone()),
            Stage::Run => self.run.toolchain.clone(),
        };
        configured.unwrap_or_else(|| Toolchain::for_program(program))
    }

    /// Expand placeholders in the given command
    ///
    /// Placeholders: `{source}`, `{binary}` (alias `{output}`), `{class}`, `{workdir}`
    pub fn expand_command(command: &[String], placeholders: &Placeholders) -> Vec<String> {
        let source = placeholders.source.to_string_lossy();
        let binary = placeholders.binary.to_string_lossy();
        let workdir = placeholders.workdir.to_string_lossy();
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{output}", &binary)
                    .replace("{binary}", &binary)
                    .replace("{class}", &placeholders.class)
                    .replace("{workdir}", &workdir)
            })
            .collect()
    }
}

/// Extract the first declared `public class` name from Java-like source text
pub fn public_class_name(code: &str) -> Option<&str> {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}

/// Source file naming rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceNaming {
    /// `main.<extension>`
    #[default]
    Main,

    /// A fixed file name
    Fixed { name: String },

    /// `<ClassName>.<extension>` from the first `public class` declaration
    PublicClass {
        #[serde(default = "default_class_name")]
        default: String,
    },
}

fn default_class_name() -> String {
    DEFAULT_CLASS_NAME.to_owned()
}

/// Values substituted into command templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub source: PathBuf,
    pub binary: PathBuf,
    pub class: String,
    pub workdir: PathBuf,
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-facing description of the program a stage needs on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    /// What is missing, e.g. "C++ compiler (g++)"
    pub name: String,

    /// What to install, e.g. "GCC"
    pub install: String,
}

impl Toolchain {
    /// Describe a toolchain by its program name alone
    pub fn for_program(program: &str) -> Self {
        Self {
            name: program.to_owned(),
            install: program.to_owned(),
        }
    }

    /// Message reported when the toolchain cannot be spawned
    pub fn missing_message(&self) -> String {
        format!("{} not found. Please install {}.", self.name, self.install)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Artifact file name (e.g., "main"); defaults to the source file stem
    #[serde(default)]
    pub output_name: Option<String>,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Resource limits for compilation (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    /// Toolchain reported when the compiler is missing
    #[serde(default)]
    pub toolchain: Option<Toolchain>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Resource limits for execution (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    /// Toolchain reported when the runtime is missing
    #[serde(default)]
    pub toolchain: Option<Toolchain>,
}
