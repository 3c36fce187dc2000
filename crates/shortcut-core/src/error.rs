use crate::validate::Violation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("variable name must not be empty")]
    EmptyVariableName,

    #[error("coercion can only be attached to a direct reference, not {0}")]
    CoercionRequiresReference(&'static str),

    #[error("variable '{0}' is read before any action sets it")]
    UndefinedVariable(String),

    #[error("no previous output to use as input for {0}")]
    NoPreviousOutput(String),

    #[error("control flow: {0}")]
    ControlFlow(String),

    #[error("document failed validation: {}", format_violations(.0))]
    Invalid(Vec<Violation>),

    #[error("no API key: set api_key in shortcut.yaml or SAVE_VIDEO_API_KEY")]
    MissingApiKey,

    #[error("malformed document: {0}")]
    Decode(String),

    #[error("dry run: {0}")]
    DryRun(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Plist(#[from] plist::Error),
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ShortcutError>;
