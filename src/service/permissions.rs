//! Caller context and per-class permission checks.

use crate::config::{ClassDefinition, PermissionKind};
use crate::error::AppError;

/// Who is calling. Root callers (internal code, hooks) bypass permission rules.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallContext {
    pub is_root: bool,
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

impl CallContext {
    pub fn root() -> Self {
        CallContext {
            is_root: true,
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>, roles: Vec<String>) -> Self {
        CallContext {
            is_root: false,
            user_id: Some(id.into()),
            roles,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Check the class's rule for `kind`. No rule means open access.
pub fn authorize(class: &ClassDefinition, kind: PermissionKind, ctx: &CallContext) -> Result<(), AppError> {
    if ctx.is_root {
        return Ok(());
    }
    let Some(rule) = class.permissions.rule(kind) else {
        return Ok(());
    };
    if rule.authenticated && !ctx.is_authenticated() {
        return Err(AppError::Permission(format!("{:?} on {} requires an authenticated caller", kind, class.name)));
    }
    if !rule.roles.is_empty() && !ctx.roles.iter().any(|r| rule.roles.contains(r)) {
        return Err(AppError::Permission(format!(
            "{:?} on {} requires one of the roles {:?}",
            kind, class.name, rule.roles
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, SchemaConfig};
    use serde_json::json;

    fn class() -> ClassDefinition {
        let config: SchemaConfig = serde_json::from_value(json!({
            "classes": [{
                "name": "Invoice",
                "permissions": {
                    "read": { "authenticated": true },
                    "delete": { "roles": ["Admin"] }
                }
            }]
        }))
        .unwrap();
        resolve(&config).unwrap().resolve("Invoice").unwrap().clone()
    }

    #[test]
    fn missing_rule_is_open() {
        assert!(authorize(&class(), PermissionKind::Create, &CallContext::anonymous()).is_ok());
    }

    #[test]
    fn authenticated_rule_needs_user() {
        let c = class();
        assert!(matches!(
            authorize(&c, PermissionKind::Read, &CallContext::anonymous()),
            Err(AppError::Permission(_))
        ));
        assert!(authorize(&c, PermissionKind::Read, &CallContext::user("u1", vec![])).is_ok());
    }

    #[test]
    fn role_rule_needs_matching_role_unless_root() {
        let c = class();
        assert!(authorize(&c, PermissionKind::Delete, &CallContext::user("u1", vec!["Editor".into()])).is_err());
        assert!(authorize(&c, PermissionKind::Delete, &CallContext::user("u1", vec!["Admin".into()])).is_ok());
        assert!(authorize(&c, PermissionKind::Delete, &CallContext::root()).is_ok());
    }
}
