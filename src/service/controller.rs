//! Controller: permission gate and hook pipeline around the CRUD engine.

use crate::config::PermissionKind;
use crate::error::AppError;
use crate::filter::FilterExpression;
use crate::hooks::{HookEvent, HookObject, HookPipeline, MutationPhase};
use crate::service::{authorize, CallContext, CrudEngine, StoredObject};
use crate::store::{Page, StorageAdapter};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct Controller<A: StorageAdapter> {
    engine: Arc<CrudEngine<A>>,
    hooks: Arc<HookPipeline>,
}

impl<A: StorageAdapter> Clone for Controller<A> {
    fn clone(&self) -> Self {
        Controller {
            engine: self.engine.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<A: StorageAdapter> Controller<A> {
    pub fn new(engine: Arc<CrudEngine<A>>, hooks: Arc<HookPipeline>) -> Self {
        Controller { engine, hooks }
    }

    pub fn engine(&self) -> &CrudEngine<A> {
        &self.engine
    }

    fn authorize(&self, class: &str, kind: PermissionKind, ctx: &CallContext) -> Result<(), AppError> {
        let def = self.engine.registry().resolve(class)?;
        authorize(def, kind, ctx)
    }

    pub async fn find_one(
        &self,
        class: &str,
        id: &str,
        fields: &[String],
        ctx: &CallContext,
    ) -> Result<Option<StoredObject>, AppError> {
        self.authorize(class, PermissionKind::Read, ctx)?;
        self.engine.find_one(class, id, fields).await
    }

    pub async fn find_many(
        &self,
        class: &str,
        filter: Option<&FilterExpression>,
        fields: &[String],
        page: Page,
        ctx: &CallContext,
    ) -> Result<Vec<StoredObject>, AppError> {
        self.authorize(class, PermissionKind::Read, ctx)?;
        self.engine.find_many(class, filter, fields, page).await
    }

    pub async fn create_one(
        &self,
        class: &str,
        data: Map<String, Value>,
        fields: &[String],
        ctx: &CallContext,
    ) -> Result<StoredObject, AppError> {
        self.authorize(class, PermissionKind::Create, ctx)?;
        let mut hook = HookObject::new(class, HookEvent::BeforeCreate, None, data, ctx.clone());
        self.hooks.run_before(&mut hook).await?;
        hook.enter(MutationPhase::Delegated);
        let created = self.engine.create_one(class, hook.new_data().clone(), fields).await?;
        self.hooks.run_after(&mut hook, Some(created.clone())).await?;
        Ok(created)
    }

    /// Before-hooks run for every item before anything is inserted.
    pub async fn create_many(
        &self,
        class: &str,
        data: Vec<Map<String, Value>>,
        fields: &[String],
        page: Page,
        ctx: &CallContext,
    ) -> Result<Vec<StoredObject>, AppError> {
        self.authorize(class, PermissionKind::Create, ctx)?;
        let mut hooks = Vec::with_capacity(data.len());
        for item in data {
            let mut hook = HookObject::new(class, HookEvent::BeforeCreate, None, item, ctx.clone());
            self.hooks.run_before(&mut hook).await?;
            hook.enter(MutationPhase::Delegated);
            hooks.push(hook);
        }
        let payload = hooks.iter().map(|h| h.new_data().clone()).collect();
        let created = self.engine.create_many(class, payload, fields, page).await?;
        self.after_each(hooks, &created).await?;
        Ok(created)
    }

    pub async fn update_one(
        &self,
        class: &str,
        id: &str,
        data: Map<String, Value>,
        fields: &[String],
        ctx: &CallContext,
    ) -> Result<StoredObject, AppError> {
        self.authorize(class, PermissionKind::Update, ctx)?;
        let original = self
            .engine
            .find_one(class, id, &[])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", class, id)))?;
        let mut hook = HookObject::new(class, HookEvent::BeforeUpdate, Some(original), data, ctx.clone());
        self.hooks.run_before(&mut hook).await?;
        hook.enter(MutationPhase::Delegated);
        let updated = self.engine.update_one(class, id, hook.new_data().clone(), fields).await?;
        self.hooks.run_after(&mut hook, Some(updated.clone())).await?;
        Ok(updated)
    }

    /// Before-hooks run once on the shared payload; after-hooks run per updated object.
    pub async fn update_many(
        &self,
        class: &str,
        filter: Option<&FilterExpression>,
        data: Map<String, Value>,
        fields: &[String],
        page: Page,
        ctx: &CallContext,
    ) -> Result<Vec<StoredObject>, AppError> {
        self.authorize(class, PermissionKind::Update, ctx)?;
        let mut hook = HookObject::new(class, HookEvent::BeforeUpdate, None, data, ctx.clone());
        self.hooks.run_before(&mut hook).await?;
        hook.enter(MutationPhase::Delegated);
        let updated = self
            .engine
            .update_many(class, filter, hook.new_data().clone(), fields, page)
            .await?;
        let hooks = updated.iter().map(|_| hook.clone()).collect();
        self.after_each(hooks, &updated).await?;
        Ok(updated)
    }

    /// Returns the object as it was before deletion.
    pub async fn delete_one(&self, class: &str, id: &str, ctx: &CallContext) -> Result<StoredObject, AppError> {
        self.authorize(class, PermissionKind::Delete, ctx)?;
        let original = self
            .engine
            .find_one(class, id, &[])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", class, id)))?;
        let mut hook = HookObject::new(class, HookEvent::BeforeDelete, Some(original.clone()), Map::new(), ctx.clone());
        self.hooks.run_before(&mut hook).await?;
        hook.enter(MutationPhase::Delegated);
        self.engine.delete_one(class, &original.id).await?;
        self.hooks.run_after(&mut hook, None).await?;
        Ok(original)
    }

    /// Snapshot the matching objects, delete exactly that set, return the snapshot.
    pub async fn delete_many(
        &self,
        class: &str,
        filter: Option<&FilterExpression>,
        ctx: &CallContext,
    ) -> Result<Vec<StoredObject>, AppError> {
        self.authorize(class, PermissionKind::Delete, ctx)?;
        let snapshot = self.engine.find_many(class, filter, &[], Page::all()).await?;
        if snapshot.is_empty() {
            return Ok(snapshot);
        }
        let mut hooks = Vec::with_capacity(snapshot.len());
        for object in &snapshot {
            let mut hook =
                HookObject::new(class, HookEvent::BeforeDelete, Some(object.clone()), Map::new(), ctx.clone());
            self.hooks.run_before(&mut hook).await?;
            hook.enter(MutationPhase::Delegated);
            hooks.push(hook);
        }
        let targets = FilterExpression::id_in_any(snapshot.iter().map(|o| o.id.as_str()));
        let deleted = self.engine.delete_many(class, Some(&targets)).await?;
        tracing::debug!(class = %class, snapshot = snapshot.len(), deleted, "deleted");
        for mut hook in hooks {
            self.hooks.run_after(&mut hook, None).await?;
        }
        Ok(snapshot)
    }

    /// Pair each after-hook object with its result by position.
    async fn after_each(&self, hooks: Vec<HookObject>, results: &[StoredObject]) -> Result<(), AppError> {
        for (mut hook, result) in hooks.into_iter().zip(results) {
            self.hooks.run_after(&mut hook, Some(result.clone())).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, SchemaConfig};
    use crate::hooks::FnHook;
    use crate::store::MemoryAdapter;
    use serde_json::json;
    use std::sync::Mutex;

    async fn controller(hooks: HookPipeline) -> Controller<MemoryAdapter> {
        let config: SchemaConfig = serde_json::from_value(json!({
            "classes": [{
                "name": "Person",
                "fields": [
                    { "name": "name", "type": "String", "required": true },
                    { "name": "age", "type": "Int" }
                ],
                "permissions": { "delete": { "roles": ["Admin"] } }
            }]
        }))
        .unwrap();
        let registry = Arc::new(resolve(&config).unwrap());
        let engine = Arc::new(CrudEngine::new(Arc::new(MemoryAdapter::new()), registry));
        engine.initialize().await.unwrap();
        Controller::new(engine, Arc::new(hooks))
    }

    fn data(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn delete_one_returns_prior_content_and_checks_roles() {
        let c = controller(HookPipeline::new()).await;
        let root = CallContext::root();
        let created = c.create_one("Person", data(json!({ "name": "Lucas" })), &[], &root).await.unwrap();

        let denied = c
            .delete_one("Person", &created.id, &CallContext::user("u1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(denied, AppError::Permission(_)));

        let admin = CallContext::user("u1", vec!["Admin".into()]);
        let deleted = c.delete_one("Person", &created.id, &admin).await.unwrap();
        assert_eq!(deleted, created);
        assert!(matches!(
            c.delete_one("Person", &created.id, &admin).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_hook_sees_original_and_merged_object() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut hooks = HookPipeline::new();
        hooks.register(
            Some("Person"),
            HookEvent::BeforeUpdate,
            Arc::new(FnHook::new("peek", move |o: &mut HookObject| {
                *sink.lock().unwrap() = Some((o.original.clone().map(|x| x.fields), o.object()));
                Ok(())
            })),
        );
        let c = controller(hooks).await;
        let root = CallContext::root();
        let created = c
            .create_one("Person", data(json!({ "name": "Lucas", "age": 23 })), &[], &root)
            .await
            .unwrap();
        c.update_one("Person", &created.id, data(json!({ "age": 24 })), &[], &root)
            .await
            .unwrap();
        let (original, merged) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(original.unwrap()["age"], json!(23));
        assert_eq!(merged["age"], json!(24));
        assert_eq!(merged["name"], json!("Lucas"));
    }

    #[tokio::test]
    async fn delete_many_runs_hooks_per_object() {
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let mut hooks = HookPipeline::new();
        hooks.register(
            None,
            HookEvent::AfterDelete,
            Arc::new(FnHook::new("count", move |_o: &mut HookObject| {
                *counter.lock().unwrap() += 1;
                Ok(())
            })),
        );
        let c = controller(hooks).await;
        let root = CallContext::root();
        for name in ["A", "B", "C"] {
            c.create_one("Person", data(json!({ "name": name, "age": 1 })), &[], &root)
                .await
                .unwrap();
        }
        let filter = FilterExpression::field("name").not_equal_to("B");
        let deleted = c.delete_many("Person", Some(&filter), &root).await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(*count.lock().unwrap(), 2);
        let left = c.find_many("Person", None, &[], Page::all(), &root).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].get("name"), Some(&json!("B")));
    }

    #[tokio::test]
    async fn after_hook_failure_keeps_the_mutation() {
        let mut hooks = HookPipeline::new();
        hooks.register(
            None,
            HookEvent::AfterCreate,
            Arc::new(FnHook::new("notify", |_o: &mut HookObject| Err(AppError::Connection("mail down".into())))),
        );
        let c = controller(hooks).await;
        let root = CallContext::root();
        let err = c
            .create_one("Person", data(json!({ "name": "Lucas" })), &[], &root)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HookFailed { .. }));
        let all = c.find_many("Person", None, &[], Page::all(), &root).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
