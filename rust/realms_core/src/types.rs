//! Domain types shared across realms_core modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the realm every other realm implicitly extends.
pub const ROOT_REALM: &str = "@root";

/// Realm used for legacy ACLs. Has no special expansion semantics.
pub const LEGACY_REALM: &str = "@legacy";

/// Project id used for realms defined in service configs.
///
/// Internal configs get no implicit root bindings and may use internal roles
/// and permissions.
pub const INTERNAL_PROJECT: &str = "@internal";

/// Prefix of roles defined in the permissions database.
pub const BUILTIN_ROLE_PREFIX: &str = "role/";

/// Prefix of roles defined in a project's realms config.
pub const CUSTOM_ROLE_PREFIX: &str = "customRole/";

/// Internal permission index, as assigned by `PermissionInterner`.
pub type PermIdx = u32;

/// Condition index, as assigned by `ConditionSet`.
pub type CondIdx = u32;

// ============================================================================
// Input config
// ============================================================================

/// Per-project realms configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmsConfig {
    #[serde(default)]
    pub realms: Vec<Realm>,
    #[serde(default)]
    pub custom_roles: Vec<CustomRole>,
}

/// A realm declared in a config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub name: String,
    /// Parent realms. `@root` is always an implicit parent and may be omitted.
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Services that must enforce realm ACLs for resources in this realm.
    #[serde(default)]
    pub enforce_in_service: Vec<String>,
}

impl Realm {
    /// An empty realm with the given name.
    pub fn named(name: &str) -> Self {
        Realm {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Grants a role to a set of principals, optionally gated by conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub principals: Vec<String>,
    /// ANDed together.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A condition on request attributes. Exactly one variant must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict: Option<AttributeRestriction>,
}

impl Condition {
    /// A `restrict` condition.
    pub fn restrict(attribute: &str, values: &[&str]) -> Self {
        Condition {
            restrict: Some(AttributeRestriction {
                attribute: attribute.to_string(),
                values: values.iter().map(|v| v.to_string()).collect(),
            }),
        }
    }
}

/// True iff the attribute has one of the listed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRestriction {
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A role defined in a project config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub name: String,
    /// Built-in or custom roles whose permissions are inherited.
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

// ============================================================================
// Expanded output
// ============================================================================

/// Flat, canonical permission table of a single project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedRealms {
    /// Sorted alphabetically. Bindings refer to permissions by position here.
    pub permissions: Vec<String>,
    /// Bindings refer to conditions by position here.
    pub conditions: Vec<NormalizedCondition>,
    /// Ordered by unprefixed realm name.
    pub realms: Vec<RealmRecord>,
}

/// A condition with sorted, deduplicated values.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NormalizedCondition {
    pub attribute: String,
    pub values: Vec<String>,
}

/// An expanded realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRecord {
    /// `<project>:<realm>`.
    pub name: String,
    pub bindings: Vec<BindingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RealmData>,
}

/// Principals granted all `permissions` when all `conditions` hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub permissions: Vec<PermIdx>,
    pub principals: Vec<String>,
    pub conditions: Vec<CondIdx>,
}

/// Realm properties inherited through `extends`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmData {
    pub enforce_in_service: Vec<String>,
}

// ============================================================================
// Internal handles
// ============================================================================

/// Identifies one condition slot in the working realm list:
/// `realms[realm].bindings[binding].conditions[position]`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConditionRef {
    pub realm: u32,
    pub binding: u32,
    pub position: u32,
}

impl fmt::Display for ConditionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "realm #{} binding #{} condition #{}",
            self.realm, self.binding, self.position
        )
    }
}
