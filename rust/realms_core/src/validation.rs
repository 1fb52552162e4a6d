//! Realms config validation.
//!
//! The expander relies on configs being well-formed: every role and realm it
//! meets must exist and inheritance graphs must be acyclic. `ConfigValidator`
//! checks all of that against a permissions database and reports the first
//! problem it finds.

use std::sync::OnceLock;

use ahash::{AHashMap, AHashSet};
use regex::Regex;

use crate::db::PermissionsDb;
use crate::error::ValidationError;
use crate::types::{
    Binding, Condition, CustomRole, Realm, RealmsConfig, BUILTIN_ROLE_PREFIX, CUSTOM_ROLE_PREFIX,
    LEGACY_REALM, ROOT_REALM,
};

/// Checks a realms config before expansion.
pub trait Validator {
    fn validate(&self, config: &RealmsConfig) -> Result<(), ValidationError>;
}

fn realm_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9_\.\-/]{1,400}$").expect("realm name pattern compiles")
    })
}

/// Validates configs against a permissions database.
pub struct ConfigValidator<'a, D: PermissionsDb + ?Sized> {
    db: &'a D,
    /// Internal configs may use internal roles and permissions.
    internal: bool,
}

impl<'a, D: PermissionsDb + ?Sized> ConfigValidator<'a, D> {
    pub fn new(db: &'a D, internal: bool) -> Self {
        ConfigValidator { db, internal }
    }

    fn validate_custom_roles(&self, roles: &[CustomRole]) -> Result<(), ValidationError> {
        let mut seen: AHashSet<&str> = AHashSet::new();
        for (i, role) in roles.iter().enumerate() {
            let path = format!("customRoles[{}]", i);
            if !role.name.starts_with(CUSTOM_ROLE_PREFIX) {
                return Err(ValidationError::new(
                    format!("{}.name", path),
                    format!(
                        "custom role {:?} must have prefix {:?}",
                        role.name, CUSTOM_ROLE_PREFIX
                    ),
                ));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(ValidationError::new(
                    format!("{}.name", path),
                    format!("custom role {:?} is already defined", role.name),
                ));
            }
        }

        for (i, role) in roles.iter().enumerate() {
            let path = format!("customRoles[{}]", i);
            for (j, perm) in role.permissions.iter().enumerate() {
                self.check_permission(&format!("{}.permissions[{}]", path, j), perm)?;
            }
            for (j, parent) in role.extends.iter().enumerate() {
                let parent_path = format!("{}.extends[{}]", path, j);
                if parent.starts_with(CUSTOM_ROLE_PREFIX) {
                    if !seen.contains(parent.as_str()) {
                        return Err(ValidationError::new(
                            parent_path,
                            format!("custom role {:?} is not defined", parent),
                        ));
                    }
                } else {
                    self.check_builtin_role(&parent_path, parent)?;
                }
            }
        }

        let graph: AHashMap<&str, Vec<&str>> = roles
            .iter()
            .map(|r| {
                let parents = r
                    .extends
                    .iter()
                    .map(String::as_str)
                    .filter(|p| p.starts_with(CUSTOM_ROLE_PREFIX))
                    .collect();
                (r.name.as_str(), parents)
            })
            .collect();
        let order: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        if let Some(cycle) = find_cycle(&order, &graph) {
            return Err(ValidationError::new(
                "customRoles",
                format!("custom roles form a cycle: {}", cycle.join(" -> ")),
            ));
        }
        Ok(())
    }

    fn validate_realms(&self, config: &RealmsConfig) -> Result<(), ValidationError> {
        let custom: AHashSet<&str> = config
            .custom_roles
            .iter()
            .map(|r| r.name.as_str())
            .collect();

        let mut names: AHashSet<&str> = AHashSet::new();
        for (i, realm) in config.realms.iter().enumerate() {
            let path = format!("realms[{}].name", i);
            check_realm_name(&path, &realm.name)?;
            if !names.insert(realm.name.as_str()) {
                return Err(ValidationError::new(
                    path,
                    format!("realm {:?} is already defined", realm.name),
                ));
            }
        }

        for (i, realm) in config.realms.iter().enumerate() {
            let path = format!("realms[{}]", i);
            self.validate_realm(&path, realm, &names, &custom)?;
        }

        let graph: AHashMap<&str, Vec<&str>> = config
            .realms
            .iter()
            .map(|r| {
                let parents = r
                    .extends
                    .iter()
                    .map(String::as_str)
                    .filter(|p| *p != ROOT_REALM)
                    .collect();
                (r.name.as_str(), parents)
            })
            .collect();
        let order: Vec<&str> = config.realms.iter().map(|r| r.name.as_str()).collect();
        if let Some(cycle) = find_cycle(&order, &graph) {
            return Err(ValidationError::new(
                "realms",
                format!("realms form a cycle: {}", cycle.join(" -> ")),
            ));
        }
        Ok(())
    }

    fn validate_realm(
        &self,
        path: &str,
        realm: &Realm,
        names: &AHashSet<&str>,
        custom: &AHashSet<&str>,
    ) -> Result<(), ValidationError> {
        for (j, parent) in realm.extends.iter().enumerate() {
            let parent_path = format!("{}.extends[{}]", path, j);
            if *parent == realm.name {
                return Err(ValidationError::new(
                    parent_path,
                    "a realm can't extend itself",
                ));
            }
            if realm.name == ROOT_REALM {
                return Err(ValidationError::new(
                    parent_path,
                    "the root realm must not use `extends`",
                ));
            }
            if parent != ROOT_REALM && !names.contains(parent.as_str()) {
                return Err(ValidationError::new(
                    parent_path,
                    format!("realm {:?} is not defined", parent),
                ));
            }
        }

        for (j, service) in realm.enforce_in_service.iter().enumerate() {
            if service.is_empty() {
                return Err(ValidationError::new(
                    format!("{}.enforceInService[{}]", path, j),
                    "service name must not be empty",
                ));
            }
        }

        for (j, binding) in realm.bindings.iter().enumerate() {
            self.validate_binding(&format!("{}.bindings[{}]", path, j), binding, custom)?;
        }
        Ok(())
    }

    fn validate_binding(
        &self,
        path: &str,
        binding: &Binding,
        custom: &AHashSet<&str>,
    ) -> Result<(), ValidationError> {
        let role_path = format!("{}.role", path);
        if binding.role.starts_with(CUSTOM_ROLE_PREFIX) {
            if !custom.contains(binding.role.as_str()) {
                return Err(ValidationError::new(
                    role_path,
                    format!("custom role {:?} is not defined", binding.role),
                ));
            }
        } else {
            self.check_builtin_role(&role_path, &binding.role)?;
        }

        for (k, principal) in binding.principals.iter().enumerate() {
            check_principal(&format!("{}.principals[{}]", path, k), principal)?;
        }
        for (k, cond) in binding.conditions.iter().enumerate() {
            self.check_condition(&format!("{}.conditions[{}]", path, k), cond)?;
        }
        Ok(())
    }

    fn check_builtin_role(&self, path: &str, role: &str) -> Result<(), ValidationError> {
        if !role.starts_with(BUILTIN_ROLE_PREFIX) {
            return Err(ValidationError::new(
                path,
                format!(
                    "role {:?} must have prefix {:?} or {:?}",
                    role, BUILTIN_ROLE_PREFIX, CUSTOM_ROLE_PREFIX
                ),
            ));
        }
        match self.db.role(role) {
            None => Err(ValidationError::new(
                path,
                format!("role {:?} is not defined", role),
            )),
            Some(def) if def.internal && !self.internal => Err(ValidationError::new(
                path,
                format!("role {:?} can only be used in internal realms", role),
            )),
            Some(_) => Ok(()),
        }
    }

    fn check_permission(&self, path: &str, perm: &str) -> Result<(), ValidationError> {
        match self.db.permission(perm) {
            None => Err(ValidationError::new(
                path,
                format!("permission {:?} is not defined", perm),
            )),
            Some(def) if def.internal && !self.internal => Err(ValidationError::new(
                path,
                format!("permission {:?} can only be used in internal roles", perm),
            )),
            Some(_) => Ok(()),
        }
    }

    fn check_condition(&self, path: &str, cond: &Condition) -> Result<(), ValidationError> {
        let restrict = cond
            .restrict
            .as_ref()
            .ok_or_else(|| ValidationError::new(path, "empty condition"))?;
        let attr_path = format!("{}.restrict.attribute", path);
        if restrict.attribute.is_empty() {
            return Err(ValidationError::new(attr_path, "attribute must not be empty"));
        }
        if !self.db.attribute_allowed(&restrict.attribute) {
            return Err(ValidationError::new(
                attr_path,
                format!("attribute {:?} can't be used in conditions", restrict.attribute),
            ));
        }
        if restrict.values.is_empty() {
            return Err(ValidationError::new(
                format!("{}.restrict.values", path),
                "at least one value is required",
            ));
        }
        Ok(())
    }
}

impl<'a, D: PermissionsDb + ?Sized> Validator for ConfigValidator<'a, D> {
    fn validate(&self, config: &RealmsConfig) -> Result<(), ValidationError> {
        self.validate_custom_roles(&config.custom_roles)?;
        self.validate_realms(config)
    }
}

fn check_realm_name(path: &str, name: &str) -> Result<(), ValidationError> {
    if name == ROOT_REALM || name == LEGACY_REALM {
        return Ok(());
    }
    if name.starts_with('@') {
        return Err(ValidationError::new(
            path,
            format!("unknown special realm name {:?}", name),
        ));
    }
    if !realm_name_re().is_match(name) {
        return Err(ValidationError::new(
            path,
            format!("invalid realm name {:?}", name),
        ));
    }
    Ok(())
}

fn check_principal(path: &str, principal: &str) -> Result<(), ValidationError> {
    match principal.split_once(':') {
        Some((kind, value)) if !kind.is_empty() && !value.is_empty() => Ok(()),
        _ => Err(ValidationError::new(
            path,
            format!("principal {:?} must have form <kind>:<value>", principal),
        )),
    }
}

/// Returns a cycle in a name -> parents graph, if any. Nodes are visited in
/// `order` so the reported cycle is stable.
fn find_cycle<'n>(
    order: &[&'n str],
    graph: &AHashMap<&'n str, Vec<&'n str>>,
) -> Option<Vec<&'n str>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: AHashMap<&str, Mark> = AHashMap::new();
    for &start in order {
        if marks.contains_key(start) {
            continue;
        }
        // (node, index of the next parent to visit)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::InProgress);

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let parents = graph.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&parent) = parents.get(top.1) {
                top.1 += 1;
                match marks.get(parent) {
                    Some(Mark::InProgress) => {
                        let from = stack.iter().position(|(n, _)| *n == parent).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[from..].iter().map(|(n, _)| *n).collect();
                        cycle.push(parent);
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(parent, Mark::InProgress);
                        stack.push((parent, 0));
                    }
                }
            } else {
                marks.insert(node, Mark::Done);
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StaticPermissionsDb;

    fn db() -> StaticPermissionsDb {
        let mut db = StaticPermissionsDb::new();
        db.add_role("role/viewer", &["p.get"])
            .add_internal_role("role/system", &["sys.admin"])
            .allow_attribute("pool");
        db
    }

    fn binding(role: &str, principals: &[&str]) -> Binding {
        Binding {
            role: role.to_string(),
            principals: principals.iter().map(|p| p.to_string()).collect(),
            conditions: vec![],
        }
    }

    fn realm(name: &str, extends: &[&str], bindings: Vec<Binding>) -> Realm {
        Realm {
            name: name.to_string(),
            extends: extends.iter().map(|s| s.to_string()).collect(),
            bindings,
            enforce_in_service: vec![],
        }
    }

    fn validate(config: &RealmsConfig, internal: bool) -> Result<(), ValidationError> {
        let db = db();
        ConfigValidator::new(&db, internal).validate(config)
    }

    fn err_path(config: &RealmsConfig) -> String {
        validate(config, false).unwrap_err().path
    }

    #[test]
    fn valid_config_passes() {
        let config = RealmsConfig {
            realms: vec![
                realm("@root", &[], vec![binding("role/viewer", &["group:all"])]),
                realm("a", &["b"], vec![binding("customRole/x", &["user:u@example.com"])]),
                realm("b", &["@root"], vec![]),
            ],
            custom_roles: vec![CustomRole {
                name: "customRole/x".into(),
                extends: vec!["role/viewer".into()],
                permissions: vec!["p.get".into()],
            }],
        };
        assert_eq!(validate(&config, false), Ok(()));
    }

    #[test]
    fn unknown_builtin_role() {
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![binding("role/nope", &["group:g"])])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&config), "realms[0].bindings[0].role");
    }

    #[test]
    fn internal_role_needs_internal_config() {
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![binding("role/system", &["group:g"])])],
            custom_roles: vec![],
        };
        assert!(validate(&config, false).is_err());
        assert_eq!(validate(&config, true), Ok(()));
    }

    #[test]
    fn unknown_custom_role() {
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![binding("customRole/nope", &["group:g"])])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&config), "realms[0].bindings[0].role");
    }

    #[test]
    fn custom_role_bad_prefix_and_duplicates() {
        let mut config = RealmsConfig::default();
        config.custom_roles.push(CustomRole {
            name: "role/x".into(),
            ..Default::default()
        });
        assert_eq!(err_path(&config), "customRoles[0].name");

        config.custom_roles = vec![
            CustomRole {
                name: "customRole/x".into(),
                ..Default::default()
            },
            CustomRole {
                name: "customRole/x".into(),
                ..Default::default()
            },
        ];
        assert_eq!(err_path(&config), "customRoles[1].name");
    }

    #[test]
    fn custom_role_unknown_permission() {
        let config = RealmsConfig {
            realms: vec![],
            custom_roles: vec![CustomRole {
                name: "customRole/x".into(),
                extends: vec![],
                permissions: vec!["p.get".into(), "p.missing".into()],
            }],
        };
        assert_eq!(err_path(&config), "customRoles[0].permissions[1]");
    }

    #[test]
    fn custom_role_cycle() {
        let config = RealmsConfig {
            realms: vec![],
            custom_roles: vec![
                CustomRole {
                    name: "customRole/a".into(),
                    extends: vec!["customRole/b".into()],
                    permissions: vec![],
                },
                CustomRole {
                    name: "customRole/b".into(),
                    extends: vec!["customRole/a".into()],
                    permissions: vec![],
                },
            ],
        };
        let err = validate(&config, false).unwrap_err();
        assert_eq!(err.path, "customRoles");
        assert!(err.message.contains("customRole/a -> customRole/b -> customRole/a"));
    }

    #[test]
    fn realm_names() {
        for bad in ["", "UPPER", "@special", "has space"] {
            let config = RealmsConfig {
                realms: vec![realm(bad, &[], vec![])],
                custom_roles: vec![],
            };
            assert_eq!(err_path(&config), "realms[0].name", "name {:?}", bad);
        }
        let config = RealmsConfig {
            realms: vec![realm("@legacy", &[], vec![]), realm("a/b.c-d_e", &[], vec![])],
            custom_roles: vec![],
        };
        assert_eq!(validate(&config, false), Ok(()));
    }

    #[test]
    fn duplicate_realm() {
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![]), realm("a", &[], vec![])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&config), "realms[1].name");
    }

    #[test]
    fn realm_extends_checks() {
        let unknown = RealmsConfig {
            realms: vec![realm("a", &["ghost"], vec![])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&unknown), "realms[0].extends[0]");

        let itself = RealmsConfig {
            realms: vec![realm("a", &["a"], vec![])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&itself), "realms[0].extends[0]");

        let root = RealmsConfig {
            realms: vec![realm("@root", &["a"], vec![]), realm("a", &[], vec![])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&root), "realms[0].extends[0]");
    }

    #[test]
    fn realm_cycle() {
        let config = RealmsConfig {
            realms: vec![
                realm("a", &["b"], vec![]),
                realm("b", &["c"], vec![]),
                realm("c", &["a"], vec![]),
            ],
            custom_roles: vec![],
        };
        let err = validate(&config, false).unwrap_err();
        assert_eq!(err.path, "realms");
        assert!(err.message.contains("a -> b -> c -> a"));
    }

    #[test]
    fn principals_need_kind() {
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![binding("role/viewer", &["group:ok", "nokind"])])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&config), "realms[0].bindings[0].principals[1]");
    }

    #[test]
    fn conditions() {
        let mut b = binding("role/viewer", &["group:g"]);
        b.conditions = vec![Condition::restrict("pool", &["x"]), Condition::default()];
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![b.clone()])],
            custom_roles: vec![],
        };
        assert_eq!(err_path(&config), "realms[0].bindings[0].conditions[1]");

        b.conditions = vec![Condition::restrict("os", &["linux"])];
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![b.clone()])],
            custom_roles: vec![],
        };
        assert_eq!(
            err_path(&config),
            "realms[0].bindings[0].conditions[0].restrict.attribute"
        );

        b.conditions = vec![Condition::restrict("pool", &[])];
        let config = RealmsConfig {
            realms: vec![realm("a", &[], vec![b])],
            custom_roles: vec![],
        };
        assert_eq!(
            err_path(&config),
            "realms[0].bindings[0].conditions[0].restrict.values"
        );
    }
}
