//! Role expansion: role name -> permission indexes.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use super::permissions::{PermissionInterner, SortedPermissions};
use crate::db::PermissionsDb;
use crate::error::{ChainKind, ExpandError, Result};
use crate::types::{CustomRole, PermIdx, BUILTIN_ROLE_PREFIX, CUSTOM_ROLE_PREFIX};

/// Sorted, deduplicated permission indexes of a role.
pub type RolePermissions = Rc<[PermIdx]>;

/// Lazily expands roles into permission sets, memoizing every role it visits.
///
/// Owns the `PermissionInterner` for the expansion, so indexes returned by
/// `resolve` are only meaningful until `into_sorted_permissions` is called.
pub struct RoleExpander<'a, D: PermissionsDb + ?Sized> {
    db: &'a D,
    custom_roles: AHashMap<&'a str, &'a CustomRole>,
    permissions: PermissionInterner,
    roles: AHashMap<String, RolePermissions>,
}

enum Frame {
    /// Visit a role: resolve it directly or schedule its parents.
    Enter(String),
    /// All parents of a custom role are resolved; combine them.
    Exit(String),
}

impl<'a, D: PermissionsDb + ?Sized> RoleExpander<'a, D> {
    pub fn new(db: &'a D, custom_roles: &'a [CustomRole]) -> Self {
        RoleExpander {
            db,
            custom_roles: custom_roles.iter().map(|r| (r.name.as_str(), r)).collect(),
            permissions: PermissionInterner::new(),
            roles: AHashMap::new(),
        }
    }

    /// Permission indexes granted by a role, including everything inherited
    /// through custom role `extends`.
    pub fn resolve(&mut self, role: &str) -> Result<RolePermissions> {
        if let Some(perms) = self.roles.get(role) {
            return Ok(perms.clone());
        }

        // Post-order walk over the custom role graph. `in_progress` holds the
        // chain of custom roles currently being expanded.
        let mut stack = vec![Frame::Enter(role.to_string())];
        let mut in_progress: AHashSet<String> = AHashSet::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(name) => {
                    if self.roles.contains_key(&name) {
                        continue;
                    }
                    if name.starts_with(BUILTIN_ROLE_PREFIX) {
                        let perms = self.builtin(&name)?;
                        self.roles.insert(name, perms);
                    } else if name.starts_with(CUSTOM_ROLE_PREFIX) {
                        if in_progress.contains(&name) {
                            return Err(ExpandError::Cycle {
                                kind: ChainKind::Role,
                                name,
                            });
                        }
                        let custom = self.custom(&name)?;
                        in_progress.insert(name.clone());
                        stack.push(Frame::Exit(name));
                        for parent in custom.extends.iter().rev() {
                            if in_progress.contains(parent) {
                                return Err(ExpandError::Cycle {
                                    kind: ChainKind::Role,
                                    name: parent.clone(),
                                });
                            }
                            if !self.roles.contains_key(parent) {
                                stack.push(Frame::Enter(parent.clone()));
                            }
                        }
                    } else {
                        return Err(ExpandError::InvalidRole(name));
                    }
                }
                Frame::Exit(name) => {
                    let custom = self.custom(&name)?;
                    let mut perms: Vec<PermIdx> = custom
                        .permissions
                        .iter()
                        .map(|p| self.permissions.intern(p))
                        .collect();
                    for parent in &custom.extends {
                        let inherited = self
                            .roles
                            .get(parent)
                            .ok_or_else(|| ExpandError::UnknownRole(parent.clone()))?;
                        perms.extend_from_slice(inherited);
                    }
                    perms.sort_unstable();
                    perms.dedup();
                    in_progress.remove(&name);
                    self.roles.insert(name, perms.into());
                }
            }
        }

        self.roles
            .get(role)
            .cloned()
            .ok_or_else(|| ExpandError::UnknownRole(role.to_string()))
    }

    fn builtin(&mut self, name: &str) -> Result<RolePermissions> {
        let def = self
            .db
            .role(name)
            .ok_or_else(|| ExpandError::UnknownRole(name.to_string()))?;
        let mut perms: Vec<PermIdx> = def
            .permissions
            .iter()
            .map(|p| self.permissions.intern(p))
            .collect();
        perms.sort_unstable();
        perms.dedup();
        Ok(perms.into())
    }

    fn custom(&self, name: &str) -> Result<&'a CustomRole> {
        self.custom_roles
            .get(name)
            .copied()
            .ok_or_else(|| ExpandError::UnknownRole(name.to_string()))
    }

    /// Finish expansion and relabel permissions alphabetically.
    pub fn into_sorted_permissions(self) -> SortedPermissions {
        self.permissions.finalize()
    }
}
