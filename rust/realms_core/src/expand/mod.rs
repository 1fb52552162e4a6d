//! Expansion of a project's realms config into a flat permission table.
//!
//! Pipeline:
//! 1. validate the config against the permissions database;
//! 2. build the working realm list (`@root` synthesized, implicit root
//!    bindings appended, sorted by name);
//! 3. register and finalize all conditions;
//! 4. per realm, walk the inheritance graph and compact the bindings;
//! 5. relabel permissions alphabetically and sort everything.
//!
//! All interning state lives in the call. Concurrent expansions of different
//! projects share nothing except the read-only database.

pub mod compact;
pub mod conditions;
pub mod permissions;
pub mod roles;
pub mod walker;

use self::compact::{compact, CompactedBindings};
use self::conditions::ConditionSet;
use self::permissions::SortedPermissions;
use self::roles::RoleExpander;
use self::walker::{RealmGraph, RealmsWalker};
use crate::db::PermissionsDb;
use crate::error::Result;
use crate::types::{
    BindingRecord, ExpandedRealms, RealmData, RealmRecord, RealmsConfig, INTERNAL_PROJECT,
};
use crate::validation::{ConfigValidator, Validator};

/// Validate and expand the realms config of a project.
///
/// Fails with `ExpandError::Validation` if the config is not valid against
/// `db`. Any other error means the database changed underneath or the
/// validator missed something; no partial result is produced.
pub fn expand_realms<D: PermissionsDb + ?Sized>(
    db: &D,
    project_id: &str,
    config: &RealmsConfig,
) -> Result<ExpandedRealms> {
    let internal = project_id == INTERNAL_PROJECT;
    // The config passed validation when it was stored, but server-side roles
    // and permissions may have changed since.
    if let Err(err) = ConfigValidator::new(db, internal).validate(config) {
        tracing::warn!(project = project_id, error = %err, "realms config failed validation");
        return Err(err.into());
    }
    expand_validated(db, project_id, config)
}

/// Expand a config that already passed validation against `db`.
pub fn expand_validated<D: PermissionsDb + ?Sized>(
    db: &D,
    project_id: &str,
    config: &RealmsConfig,
) -> Result<ExpandedRealms> {
    let internal = project_id == INTERNAL_PROJECT;

    // Implicit bindings may carry conditions, so they must be in place before
    // conditions are registered.
    let implicit = if internal {
        Vec::new()
    } else {
        db.implicit_root_bindings(project_id)
    };
    let graph = RealmGraph::build(config, implicit);
    tracing::debug!(
        project = project_id,
        realms = graph.len(),
        internal,
        "expanding realms"
    );

    let mut conds = ConditionSet::new();
    for (slot, cond) in graph.condition_slots() {
        conds.add(slot, cond)?;
    }
    let (cond_index, conditions) = conds.finalize();

    let roles = RoleExpander::new(db, &config.custom_roles);
    let mut walker = RealmsWalker::new(roles, cond_index, &graph);

    let mut expanded: Vec<(&str, CompactedBindings, Option<RealmData>)> =
        Vec::with_capacity(graph.len());
    for realm in graph.realms() {
        let bindings = compact(walker.per_principal_bindings(&realm.name)?)?;
        let data = walker.realm_data(&realm.name)?;
        expanded.push((realm.name.as_str(), bindings, data));
    }

    // Every permission used anywhere has been interned by now.
    let permissions = walker.into_roles().into_sorted_permissions();
    tracing::debug!(
        project = project_id,
        permissions = permissions.names.len(),
        conditions = conditions.len(),
        "realms expanded"
    );

    let realms = expanded
        .into_iter()
        .map(|(name, bindings, data)| RealmRecord {
            name: format!("{}:{}", project_id, name),
            bindings: to_normalized_bindings(bindings, &permissions),
            data,
        })
        .collect();

    Ok(ExpandedRealms {
        permissions: permissions.names,
        conditions,
        realms,
    })
}

/// Relabel permissions to their final indexes and sort bindings by
/// `(permissions, conditions, principals)`.
pub fn to_normalized_bindings(
    bindings: CompactedBindings,
    permissions: &SortedPermissions,
) -> Vec<BindingRecord> {
    let mut out: Vec<BindingRecord> = bindings
        .into_iter()
        .map(|((perms, conds), mut principals)| {
            let mut perms: Vec<_> = perms.iter().map(|&p| permissions.remap(p)).collect();
            perms.sort_unstable();
            principals.sort_unstable();
            principals.dedup();
            BindingRecord {
                permissions: perms,
                principals,
                conditions: conds.to_vec(),
            }
        })
        .collect();
    out.sort_unstable_by(|a, b| {
        (&a.permissions, &a.conditions, &a.principals).cmp(&(
            &b.permissions,
            &b.conditions,
            &b.principals,
        ))
    });
    out
}
