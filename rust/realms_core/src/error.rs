//! Error types for realm expansion.

use thiserror::Error;

use crate::types::ConditionRef;

/// A config rejected by the validator. The only error kind expected when
/// expanding configs written by humans.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// Location of the offending field, e.g. `realms[1].bindings[0].role`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// What kind of inheritance chain a `Cycle` error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Realm,
    Role,
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainKind::Realm => write!(f, "realm"),
            ChainKind::Role => write!(f, "role"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("invalid realms config: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role {0} has neither a built-in nor a custom role prefix")]
    InvalidRole(String),

    #[error("unknown realm: {0}")]
    UnknownRealm(String),

    #[error("condition at {0} was never added to the condition set")]
    UnknownCondition(ConditionRef),

    #[error("invalid empty condition at {0}")]
    EmptyCondition(ConditionRef),

    #[error("{kind} inheritance cycle or chain too deep at {name}")]
    Cycle { kind: ChainKind, name: String },
}

impl ExpandError {
    /// True for errors that mean an upstream contract was broken (validation
    /// bypassed or the permissions database disagrees with the config).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExpandError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ExpandError>;
