//! Realm inheritance graph traversal.

use std::collections::BTreeMap;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use super::conditions::ConditionIndex;
use super::roles::{RoleExpander, RolePermissions};
use crate::db::PermissionsDb;
use crate::error::{ChainKind, ExpandError, Result};
use crate::types::{
    Binding, CondIdx, Condition, ConditionRef, Realm, RealmData, RealmsConfig, ROOT_REALM,
};

/// All realms of a config, sorted by name, with `@root` guaranteed present.
#[derive(Debug, Clone)]
pub struct RealmGraph {
    realms: Vec<Realm>,
    index: AHashMap<String, usize>,
}

impl RealmGraph {
    /// Build the working realm list. Synthesizes `@root` if the config has no
    /// such realm and appends `implicit_root_bindings` to it.
    pub fn build(config: &RealmsConfig, implicit_root_bindings: Vec<Binding>) -> Self {
        let mut by_name: BTreeMap<&str, Realm> = config
            .realms
            .iter()
            .map(|r| (r.name.as_str(), r.clone()))
            .collect();
        by_name
            .entry(ROOT_REALM)
            .or_insert_with(|| Realm::named(ROOT_REALM))
            .bindings
            .extend(implicit_root_bindings);

        let realms: Vec<Realm> = by_name.into_values().collect();
        let index = realms
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        RealmGraph { realms, index }
    }

    /// Realms in name order.
    pub fn realms(&self) -> &[Realm] {
        &self.realms
    }

    pub(crate) fn len(&self) -> usize {
        self.realms.len()
    }

    /// Position of a realm in `realms()`.
    pub fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ExpandError::UnknownRealm(name.to_string()))
    }

    /// Names of the immediate parents of a realm: `@root` first (unless the
    /// realm is `@root` itself), then explicit `extends` in declaration order.
    pub fn parents<'r>(realm: &'r Realm) -> impl Iterator<Item = &'r str> + 'r {
        let is_root = realm.name == ROOT_REALM;
        let root: Option<&'r str> = (!is_root).then_some(ROOT_REALM);
        let explicit = realm
            .extends
            .iter()
            .map(String::as_str)
            .filter(move |name| !is_root && *name != ROOT_REALM);
        root.into_iter().chain(explicit)
    }

    fn parent_positions(&self, realm: &Realm) -> Result<Vec<usize>> {
        Self::parents(realm).map(|p| self.position(p)).collect()
    }

    /// Every condition of every binding, in realm then declaration order.
    pub fn condition_slots(&self) -> impl Iterator<Item = (ConditionRef, &Condition)> + '_ {
        self.realms.iter().enumerate().flat_map(|(r, realm)| {
            realm.bindings.iter().enumerate().flat_map(move |(b, binding)| {
                binding
                    .conditions
                    .iter()
                    .enumerate()
                    .map(move |(c, cond)| (slot(r, b, c), cond))
            })
        })
    }
}

fn slot(realm: usize, binding: usize, position: usize) -> ConditionRef {
    ConditionRef {
        realm: realm as u32,
        binding: binding as u32,
        position: position as u32,
    }
}

/// One principal's share of a binding reachable from a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalBinding<'g> {
    pub principal: &'g str,
    pub permissions: RolePermissions,
    pub conditions: Rc<[CondIdx]>,
}

/// Walks the realm graph, resolving roles and conditions along the way.
pub struct RealmsWalker<'a, D: PermissionsDb + ?Sized> {
    roles: RoleExpander<'a, D>,
    conditions: ConditionIndex,
    graph: &'a RealmGraph,
    data: AHashMap<usize, Option<RealmData>>,
}

impl<'a, D: PermissionsDb + ?Sized> RealmsWalker<'a, D> {
    /// `conditions` must come from a `ConditionSet` populated with every
    /// condition slot of `graph`.
    pub fn new(
        roles: RoleExpander<'a, D>,
        conditions: ConditionIndex,
        graph: &'a RealmGraph,
    ) -> Self {
        RealmsWalker {
            roles,
            conditions,
            graph,
            data: AHashMap::new(),
        }
    }

    /// Lazily yields `(principal, permissions, conditions)` for every binding
    /// in the realm and all its ancestors, depth-first, parents in `parents`
    /// order. The sequence contains duplicates when a realm is reachable
    /// through several paths; callers deduplicate.
    pub fn per_principal_bindings(
        &mut self,
        realm: &str,
    ) -> Result<PrincipalBindings<'_, 'a, D>> {
        let start = self.graph.position(realm)?;
        Ok(PrincipalBindings {
            walker: self,
            stack: vec![(start, 0)],
            realm: None,
            active: None,
            failed: false,
        })
    }

    /// Permissions and condition indexes of `realms[realm].bindings[binding]`.
    fn grant(&mut self, realm: usize, binding: usize) -> Result<(RolePermissions, Rc<[CondIdx]>)> {
        let graph = self.graph;
        let b = &graph.realms[realm].bindings[binding];
        let permissions = self.roles.resolve(&b.role)?;
        let slots: Vec<ConditionRef> = (0..b.conditions.len())
            .map(|c| slot(realm, binding, c))
            .collect();
        let conditions = self.conditions.indexes(&slots)?;
        Ok((permissions, conditions.into()))
    }

    /// Data of a realm merged with data of all its ancestors. `None` when
    /// there is nothing to report.
    pub fn realm_data(&mut self, realm: &str) -> Result<Option<RealmData>> {
        let graph = self.graph;
        let start = graph.position(realm)?;

        // (realm, parents done)
        let mut stack = vec![(start, false)];
        let mut in_progress: AHashSet<usize> = AHashSet::new();

        while let Some((idx, parents_done)) = stack.pop() {
            if self.data.contains_key(&idx) {
                continue;
            }
            let current = &graph.realms[idx];
            let parents = graph.parent_positions(current)?;

            if !parents_done {
                if in_progress.contains(&idx) {
                    return Err(ExpandError::Cycle {
                        kind: ChainKind::Realm,
                        name: current.name.clone(),
                    });
                }
                in_progress.insert(idx);
                stack.push((idx, true));
                for &parent in parents.iter().rev() {
                    if !self.data.contains_key(&parent) {
                        stack.push((parent, false));
                    }
                }
                continue;
            }

            let mut services = current.enforce_in_service.clone();
            for parent in parents {
                if let Some(Some(inherited)) = self.data.get(&parent) {
                    services.extend(inherited.enforce_in_service.iter().cloned());
                }
            }
            services.sort_unstable();
            services.dedup();

            in_progress.remove(&idx);
            let data = (!services.is_empty()).then_some(RealmData {
                enforce_in_service: services,
            });
            self.data.insert(idx, data);
        }

        Ok(self.data.get(&start).cloned().flatten())
    }

    /// Give back the role expander, e.g. to finalize permissions.
    pub fn into_roles(self) -> RoleExpander<'a, D> {
        self.roles
    }
}

/// Position within a realm's own bindings.
struct RealmCursor {
    realm: usize,
    depth: usize,
    next_binding: usize,
}

/// Position within a binding's principals.
struct ActiveBinding {
    realm: usize,
    binding: usize,
    next_principal: usize,
    permissions: RolePermissions,
    conditions: Rc<[CondIdx]>,
}

/// Iterator returned by `RealmsWalker::per_principal_bindings`.
///
/// Uses an explicit stack instead of recursion. Stops after the first error.
pub struct PrincipalBindings<'w, 'a, D: PermissionsDb + ?Sized> {
    walker: &'w mut RealmsWalker<'a, D>,
    /// Realms still to visit, with their distance from the starting realm.
    stack: Vec<(usize, usize)>,
    realm: Option<RealmCursor>,
    active: Option<ActiveBinding>,
    failed: bool,
}

impl<'w, 'a, D: PermissionsDb + ?Sized> PrincipalBindings<'w, 'a, D> {
    fn fail(&mut self, err: ExpandError) -> Option<Result<PrincipalBinding<'a>>> {
        self.failed = true;
        Some(Err(err))
    }
}

impl<'w, 'a, D: PermissionsDb + ?Sized> Iterator for PrincipalBindings<'w, 'a, D> {
    type Item = Result<PrincipalBinding<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let graph: &'a RealmGraph = self.walker.graph;

        loop {
            if let Some(active) = &mut self.active {
                let binding = &graph.realms[active.realm].bindings[active.binding];
                if let Some(principal) = binding.principals.get(active.next_principal) {
                    active.next_principal += 1;
                    return Some(Ok(PrincipalBinding {
                        principal: principal.as_str(),
                        permissions: active.permissions.clone(),
                        conditions: active.conditions.clone(),
                    }));
                }
                self.active = None;
            }

            if let Some(cursor) = &mut self.realm {
                let realm = &graph.realms[cursor.realm];
                if cursor.next_binding < realm.bindings.len() {
                    let (r, b) = (cursor.realm, cursor.next_binding);
                    cursor.next_binding += 1;
                    match self.walker.grant(r, b) {
                        Ok((permissions, conditions)) => {
                            self.active = Some(ActiveBinding {
                                realm: r,
                                binding: b,
                                next_principal: 0,
                                permissions,
                                conditions,
                            });
                        }
                        Err(err) => return self.fail(err),
                    }
                    continue;
                }

                let depth = cursor.depth;
                match graph.parent_positions(realm) {
                    Ok(parents) => {
                        self.stack
                            .extend(parents.into_iter().rev().map(|p| (p, depth + 1)));
                    }
                    Err(err) => return self.fail(err),
                }
                self.realm = None;
            }

            let (realm, depth) = self.stack.pop()?;
            // An acyclic path visits each realm at most once.
            if depth >= graph.len() {
                let name = graph.realms[realm].name.clone();
                return self.fail(ExpandError::Cycle {
                    kind: ChainKind::Realm,
                    name,
                });
            }
            self.realm = Some(RealmCursor {
                realm,
                depth,
                next_binding: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_synthesizes_root() {
        let config = RealmsConfig {
            realms: vec![Realm::named("b"), Realm::named("a")],
            custom_roles: vec![],
        };
        let graph = RealmGraph::build(&config, vec![]);
        let names: Vec<&str> = graph.realms().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["@root", "a", "b"]);
        assert_eq!(graph.position("a"), Ok(1));
        assert_eq!(
            graph.position("zzz"),
            Err(ExpandError::UnknownRealm("zzz".into()))
        );
    }

    #[test]
    fn build_appends_implicit_bindings_to_existing_root() {
        let mut root = Realm::named(ROOT_REALM);
        root.bindings.push(Binding {
            role: "role/a".into(),
            principals: vec!["user:x".into()],
            conditions: vec![],
        });
        let config = RealmsConfig {
            realms: vec![root],
            custom_roles: vec![],
        };
        let implicit = vec![Binding {
            role: "role/owner".into(),
            principals: vec!["project:p".into()],
            conditions: vec![],
        }];
        let graph = RealmGraph::build(&config, implicit);
        let roles: Vec<&str> = graph.realms()[0]
            .bindings
            .iter()
            .map(|b| b.role.as_str())
            .collect();
        assert_eq!(roles, vec!["role/a", "role/owner"]);
    }

    #[test]
    fn parents_of_root_and_others() {
        let root = Realm::named(ROOT_REALM);
        assert_eq!(RealmGraph::parents(&root).count(), 0);

        let mut realm = Realm::named("child");
        realm.extends = vec!["b".into(), ROOT_REALM.into(), "a".into()];
        let parents: Vec<&str> = RealmGraph::parents(&realm).collect();
        assert_eq!(parents, vec!["@root", "b", "a"]);
    }

    #[test]
    fn condition_slots_enumerate_in_order() {
        let mut a = Realm::named("a");
        a.bindings.push(Binding {
            role: "role/x".into(),
            principals: vec![],
            conditions: vec![
                Condition::restrict("k", &["1"]),
                Condition::restrict("k", &["2"]),
            ],
        });
        let config = RealmsConfig {
            realms: vec![a],
            custom_roles: vec![],
        };
        let graph = RealmGraph::build(&config, vec![]);
        let slots: Vec<ConditionRef> = graph.condition_slots().map(|(s, _)| s).collect();
        assert_eq!(slots, vec![slot(1, 0, 0), slot(1, 0, 1)]);
    }
}
