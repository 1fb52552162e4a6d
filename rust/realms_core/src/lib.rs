//! `realms_core` — realms expansion engine.
//!
//! Turns a project's hierarchical realms config (realms extending realms,
//! custom roles extending roles, conditional bindings) into a flat,
//! canonical permission table that can be checked without further lookups.
//!
//! Modules:
//! - `types`      — config input and expanded output types
//! - `error`      — validation and expansion errors
//! - `config`     — JSON loading of configs and database snapshots
//! - `db`         — permissions database (built-in roles, permissions)
//! - `validation` — config validation against the database
//! - `expand`     — the expansion pipeline

pub mod config;
pub mod db;
pub mod error;
pub mod expand;
pub mod types;
pub mod validation;

pub use db::{PermissionsDb, StaticPermissionsDb};
pub use error::{ExpandError, Result, ValidationError};
pub use expand::{expand_realms, expand_validated};
pub use types::{
    BindingRecord, ExpandedRealms, NormalizedCondition, RealmData, RealmRecord, RealmsConfig,
};
