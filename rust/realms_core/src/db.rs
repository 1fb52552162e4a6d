//! Permissions database: built-in roles and permissions.
//!
//! The expander only reads from the database. A snapshot must not change
//! while an expansion that uses it is running.

use ahash::{AHashMap, AHashSet};
use serde::Deserialize;

use crate::types::Binding;

/// A permission known to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionDef {
    pub name: String,
    /// Internal permissions may only be used by internal realms.
    #[serde(default)]
    pub internal: bool,
}

/// A built-in role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleDef {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Internal roles may only be used by internal realms.
    #[serde(default)]
    pub internal: bool,
}

/// Read-only view of built-in roles and permissions.
pub trait PermissionsDb {
    /// Looks up a built-in role by its full name (e.g. `role/luci.viewer`).
    fn role(&self, name: &str) -> Option<&RoleDef>;

    /// Looks up a permission by name.
    fn permission(&self, name: &str) -> Option<&PermissionDef>;

    /// Whether conditions may restrict the given attribute.
    fn attribute_allowed(&self, attribute: &str) -> bool;

    /// Bindings appended to `@root` of every non-internal project.
    fn implicit_root_bindings(&self, project_id: &str) -> Vec<Binding>;
}

/// JSON form of a database snapshot.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbSnapshot {
    #[serde(default)]
    permissions: Vec<PermissionDef>,
    #[serde(default)]
    roles: Vec<RoleDef>,
    #[serde(default)]
    implicit_root_roles: Vec<String>,
    #[serde(default)]
    attributes: Vec<String>,
}

/// In-memory permissions database, indexed by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "DbSnapshot")]
pub struct StaticPermissionsDb {
    permissions: AHashMap<String, PermissionDef>,
    roles: AHashMap<String, RoleDef>,
    /// Roles granted to `project:<id>` in `@root` of every project.
    implicit_root_roles: Vec<String>,
    /// Allowed condition attributes. Empty means any attribute is allowed.
    attributes: AHashSet<String>,
}

impl From<DbSnapshot> for StaticPermissionsDb {
    fn from(snapshot: DbSnapshot) -> Self {
        let mut db = StaticPermissionsDb::new();
        for perm in snapshot.permissions {
            db.permissions.insert(perm.name.clone(), perm);
        }
        for role in snapshot.roles {
            db.roles.insert(role.name.clone(), role);
        }
        db.implicit_root_roles = snapshot.implicit_root_roles;
        db.attributes = snapshot.attributes.into_iter().collect();
        db
    }
}

impl StaticPermissionsDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a permission.
    pub fn add_permission(&mut self, name: &str, internal: bool) -> &mut Self {
        self.permissions.insert(
            name.to_string(),
            PermissionDef {
                name: name.to_string(),
                internal,
            },
        );
        self
    }

    /// Register a non-internal built-in role. Unknown permissions it mentions
    /// are registered as non-internal.
    pub fn add_role(&mut self, name: &str, permissions: &[&str]) -> &mut Self {
        self.insert_role(name, permissions, false)
    }

    /// Register an internal built-in role.
    pub fn add_internal_role(&mut self, name: &str, permissions: &[&str]) -> &mut Self {
        self.insert_role(name, permissions, true)
    }

    fn insert_role(&mut self, name: &str, permissions: &[&str], internal: bool) -> &mut Self {
        for perm in permissions {
            if !self.permissions.contains_key(*perm) {
                self.add_permission(perm, internal);
            }
        }
        self.roles.insert(
            name.to_string(),
            RoleDef {
                name: name.to_string(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                internal,
            },
        );
        self
    }

    /// Grant `role` to `project:<id>` in `@root` of every project.
    pub fn add_implicit_root_role(&mut self, role: &str) -> &mut Self {
        self.implicit_root_roles.push(role.to_string());
        self
    }

    /// Restrict which attributes conditions may use.
    pub fn allow_attribute(&mut self, attribute: &str) -> &mut Self {
        self.attributes.insert(attribute.to_string());
        self
    }
}

impl PermissionsDb for StaticPermissionsDb {
    fn role(&self, name: &str) -> Option<&RoleDef> {
        self.roles.get(name)
    }

    fn permission(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.get(name)
    }

    fn attribute_allowed(&self, attribute: &str) -> bool {
        self.attributes.is_empty() || self.attributes.contains(attribute)
    }

    fn implicit_root_bindings(&self, project_id: &str) -> Vec<Binding> {
        let principal = format!("project:{}", project_id);
        self.implicit_root_roles
            .iter()
            .map(|role| Binding {
                role: role.clone(),
                principals: vec![principal.clone()],
                conditions: Vec::new(),
            })
            .collect()
    }
}
