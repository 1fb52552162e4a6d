//! Binding compaction.
//!
//! Turns the duplicate-laden stream produced by `RealmsWalker` into a minimal
//! set of bindings in two passes:
//!
//! 1. `(principal, conditions) -> permissions`: unions permissions reachable
//!    through different inheritance paths.
//! 2. `(permissions, conditions) -> principals`: merges principals that ended
//!    up with identical grants.
//!
//! Permission sets must be complete before they are used as keys, so the
//! passes cannot be swapped.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use super::walker::PrincipalBinding;
use crate::error::Result;
use crate::types::{CondIdx, PermIdx};

/// `(sorted permissions, sorted conditions)` of a compacted binding.
pub type BindingKey = (Vec<PermIdx>, Rc<[CondIdx]>);

/// Principals per distinct `(permissions, conditions)` pair. Permissions still
/// use internal indexes.
pub type CompactedBindings = AHashMap<BindingKey, Vec<String>>;

/// Compact a stream of per-principal grants. Stops at the first error.
pub fn compact<'g, I>(grants: I) -> Result<CompactedBindings>
where
    I: IntoIterator<Item = Result<PrincipalBinding<'g>>>,
{
    let mut principal_to_perms: AHashMap<(&'g str, Rc<[CondIdx]>), AHashSet<PermIdx>> =
        AHashMap::new();
    for grant in grants {
        let grant = grant?;
        principal_to_perms
            .entry((grant.principal, grant.conditions))
            .or_default()
            .extend(grant.permissions.iter().copied());
    }

    let mut perms_to_principals = CompactedBindings::new();
    for ((principal, conditions), perms) in principal_to_perms {
        let mut perms: Vec<PermIdx> = perms.into_iter().collect();
        perms.sort_unstable();
        perms_to_principals
            .entry((perms, conditions))
            .or_default()
            .push(principal.to_string());
    }
    Ok(perms_to_principals)
}
