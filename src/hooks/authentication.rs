//! Credential hook for the identity-holder class.
//!
//! When a create or update of `User` carries `authentication`, each provider entry
//! (`authentication.emailPassword`, ...) is handed to the provider registered under that key,
//! which returns the value to store in its place (typically with secrets hashed).

use crate::config::{AUTHENTICATION_FIELD, IDENTITY_CLASS};
use crate::error::AppError;
use crate::hooks::{Hook, HookEvent, HookObject, HookPipeline};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const HOOK_NAME: &str = "authentication";

/// What the provider is deriving a value for.
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialContext {
    pub class_name: String,
    /// Dotted path of the sub-field, e.g. `authentication.emailPassword`.
    pub field_path: String,
    pub is_root: bool,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Replace the raw credential with the value to persist.
    async fn derive(&self, raw: &Value, ctx: &CredentialContext) -> Result<Value, AppError>;
}

#[derive(Default, Clone)]
pub struct AuthenticationHook {
    providers: BTreeMap<String, Arc<dyn CredentialProvider>>,
}

impl AuthenticationHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, key: &str, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.insert(key.to_string(), provider);
        self
    }

    /// Register as a before-create and before-update hook on the identity class.
    pub fn register(self, pipeline: &mut HookPipeline) {
        let hook: Arc<dyn Hook> = Arc::new(self);
        pipeline
            .register(Some(IDENTITY_CLASS), HookEvent::BeforeCreate, hook.clone())
            .register(Some(IDENTITY_CLASS), HookEvent::BeforeUpdate, hook);
    }
}

#[async_trait]
impl Hook for AuthenticationHook {
    fn name(&self) -> &str {
        HOOK_NAME
    }

    async fn run(&self, object: &mut HookObject) -> Result<(), AppError> {
        if !object.is_field_update(AUTHENTICATION_FIELD) {
            return Ok(());
        }
        let raw = match object.new_data().get(AUTHENTICATION_FIELD) {
            Some(Value::Object(map)) => map.clone(),
            _ => return Ok(()),
        };
        let mut derived = Map::with_capacity(raw.len());
        for (key, value) in raw {
            if value.is_null() {
                derived.insert(key, value);
                continue;
            }
            let provider = self.providers.get(&key).ok_or_else(|| AppError::HookAbort {
                hook: HOOK_NAME.to_string(),
                message: format!("no credential provider for '{}'", key),
            })?;
            let ctx = CredentialContext {
                class_name: object.class_name.clone(),
                field_path: format!("{}.{}", AUTHENTICATION_FIELD, key),
                is_root: true,
            };
            let value = provider.derive(&value, &ctx).await?;
            derived.insert(key, value);
        }
        object.upsert_new_data(AUTHENTICATION_FIELD, Value::Object(derived));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CallContext;
    use serde_json::json;

    struct Reverse;

    #[async_trait]
    impl CredentialProvider for Reverse {
        async fn derive(&self, raw: &Value, ctx: &CredentialContext) -> Result<Value, AppError> {
            assert!(ctx.is_root);
            assert_eq!(ctx.field_path, "authentication.emailPassword");
            let mut out = raw.as_object().cloned().unwrap_or_default();
            if let Some(Value::String(p)) = out.get("password") {
                let hashed: String = p.chars().rev().collect();
                out.insert("password".into(), json!(hashed));
            }
            Ok(Value::Object(out))
        }
    }

    fn user(data: Value) -> HookObject {
        HookObject::new(
            IDENTITY_CLASS,
            HookEvent::BeforeCreate,
            None,
            data.as_object().cloned().unwrap(),
            CallContext::anonymous(),
        )
    }

    #[tokio::test]
    async fn derives_each_provider_entry() {
        let mut pipeline = HookPipeline::new();
        AuthenticationHook::new()
            .with_provider("emailPassword", Arc::new(Reverse))
            .register(&mut pipeline);
        assert_eq!(pipeline.len(), 2);
        let mut o = user(json!({
            "authentication": { "emailPassword": { "email": "a@b.io", "password": "secret" } }
        }));
        pipeline.run_before(&mut o).await.unwrap();
        assert_eq!(o.new_data()["authentication"]["emailPassword"]["password"], json!("terces"));
        assert_eq!(o.new_data()["authentication"]["emailPassword"]["email"], json!("a@b.io"));
    }

    #[tokio::test]
    async fn unknown_provider_aborts() {
        let mut o = user(json!({ "authentication": { "magicLink": { "token": "x" } } }));
        let err = AuthenticationHook::new().run(&mut o).await.unwrap_err();
        assert!(matches!(err, AppError::HookAbort { .. }));
    }

    #[tokio::test]
    async fn untouched_without_authentication() {
        let mut o = user(json!({ "email": "a@b.io" }));
        AuthenticationHook::new().run(&mut o).await.unwrap();
        assert!(!o.is_field_update("authentication"));
    }
}
