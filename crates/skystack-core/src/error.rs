use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("YAML parse error: {path}\nreason: {message}")]
    YamlParse { path: PathBuf, message: String },

    #[error("file read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error(
        "project root not found\nsearched upward from: {0}\nhint: run inside a directory tree containing skystack.yaml"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
