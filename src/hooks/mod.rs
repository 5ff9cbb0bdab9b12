//! Hook pipeline: ordered before/after callbacks around every mutation.
//!
//! Per mutation the pipeline moves `NotStarted -> BeforeHooksRunning -> Delegated ->
//! AfterHooksRunning -> Complete`. A failing before-hook stops the mutation before it reaches
//! storage; a failing after-hook is reported but the mutation stays persisted.

pub mod authentication;

pub use authentication::{AuthenticationHook, CredentialContext, CredentialProvider};

use crate::error::AppError;
use crate::service::{CallContext, StoredObject};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookEvent {
    /// The after event paired with a before event.
    pub fn after(self) -> HookEvent {
        match self {
            HookEvent::BeforeCreate | HookEvent::AfterCreate => HookEvent::AfterCreate,
            HookEvent::BeforeUpdate | HookEvent::AfterUpdate => HookEvent::AfterUpdate,
            HookEvent::BeforeDelete | HookEvent::AfterDelete => HookEvent::AfterDelete,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationPhase {
    NotStarted,
    BeforeHooksRunning,
    Delegated,
    AfterHooksRunning,
    Complete,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationPhase::NotStarted => "not_started",
            MutationPhase::BeforeHooksRunning => "before_hooks",
            MutationPhase::Delegated => "delegated",
            MutationPhase::AfterHooksRunning => "after_hooks",
            MutationPhase::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// The object being mutated, as seen by hooks. Lives for one mutation.
#[derive(Clone, Debug)]
pub struct HookObject {
    pub class_name: String,
    pub event: HookEvent,
    /// Stored state before the mutation, when there is one.
    pub original: Option<StoredObject>,
    new_data: Map<String, Value>,
    pub context: CallContext,
    /// Stored state after the mutation; set for after-hooks.
    pub result: Option<StoredObject>,
    phase: MutationPhase,
}

impl HookObject {
    pub fn new(
        class_name: &str,
        event: HookEvent,
        original: Option<StoredObject>,
        new_data: Map<String, Value>,
        context: CallContext,
    ) -> Self {
        HookObject {
            class_name: class_name.to_string(),
            event,
            original,
            new_data,
            context,
            result: None,
            phase: MutationPhase::NotStarted,
        }
    }

    /// Whether the incoming update carries this top-level field.
    pub fn is_field_update(&self, field: &str) -> bool {
        self.new_data.contains_key(field)
    }

    pub fn new_data(&self) -> &Map<String, Value> {
        &self.new_data
    }

    /// Insert or replace a field of the incoming update.
    pub fn upsert_new_data(&mut self, field: &str, value: Value) {
        self.new_data.insert(field.to_string(), value);
    }

    /// The object as it will look once the update is applied.
    pub fn object(&self) -> Map<String, Value> {
        let mut merged = self.original.as_ref().map(|o| o.fields.clone()).unwrap_or_default();
        for (k, v) in &self.new_data {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// Record a phase transition of this mutation.
    pub fn enter(&mut self, phase: MutationPhase) {
        tracing::trace!(class = %self.class_name, from = %self.phase, to = %phase, "mutation phase");
        self.phase = phase;
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, object: &mut HookObject) -> Result<(), AppError>;
}

/// Hook from a synchronous closure.
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut HookObject) -> Result<(), AppError> + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        FnHook { name: name.to_string(), f }
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&mut HookObject) -> Result<(), AppError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, object: &mut HookObject) -> Result<(), AppError> {
        (self.f)(object)
    }
}

struct Registration {
    class: Option<String>,
    event: HookEvent,
    hook: Arc<dyn Hook>,
}

/// Hooks in registration order. Build it before serving; it is read-only afterwards.
#[derive(Default)]
pub struct HookPipeline {
    hooks: Vec<Registration>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `event` on `class`, or on every class when `class` is `None`.
    pub fn register(&mut self, class: Option<&str>, event: HookEvent, hook: Arc<dyn Hook>) -> &mut Self {
        self.hooks.push(Registration {
            class: class.map(str::to_string),
            event,
            hook,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn matching<'a>(&'a self, class: &'a str, event: HookEvent) -> impl Iterator<Item = &'a Arc<dyn Hook>> + 'a {
        self.hooks
            .iter()
            .filter(move |r| r.event == event && r.class.as_deref().map_or(true, |c| c == class))
            .map(|r| &r.hook)
    }

    /// Run before-hooks for `object.event` sequentially. The first failure aborts with `HookAbort`.
    pub async fn run_before(&self, object: &mut HookObject) -> Result<(), AppError> {
        object.enter(MutationPhase::BeforeHooksRunning);
        let class = object.class_name.clone();
        for hook in self.matching(&class, object.event) {
            if let Err(e) = hook.run(object).await {
                tracing::debug!(hook = %hook.name(), class = %class, error = %e, "before-hook aborted mutation");
                return Err(match e {
                    AppError::HookAbort { .. } => e,
                    other => AppError::HookAbort {
                        hook: hook.name().to_string(),
                        message: other.to_string(),
                    },
                });
            }
        }
        Ok(())
    }

    /// Switch `object` to its after event with `result` set, then run after-hooks sequentially.
    /// The first failure is returned as `HookFailed`; the mutation itself is already persisted.
    pub async fn run_after(&self, object: &mut HookObject, result: Option<StoredObject>) -> Result<(), AppError> {
        object.event = object.event.after();
        object.result = result;
        object.enter(MutationPhase::AfterHooksRunning);
        let class = object.class_name.clone();
        for hook in self.matching(&class, object.event) {
            if let Err(e) = hook.run(object).await {
                tracing::warn!(hook = %hook.name(), class = %class, error = %e, "after-hook failed");
                return Err(AppError::HookFailed {
                    hook: hook.name().to_string(),
                    message: e.to_string(),
                });
            }
        }
        object.enter(MutationPhase::Complete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Arc<dyn Hook> {
        let log = log.clone();
        let label = name.to_string();
        Arc::new(FnHook::new(name, move |_o: &mut HookObject| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        }))
    }

    fn object(event: HookEvent) -> HookObject {
        let data = json!({ "name": "Lucas" }).as_object().cloned().unwrap();
        HookObject::new("Person", event, None, data, CallContext::root())
    }

    #[tokio::test]
    async fn runs_in_registration_order_for_matching_class() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = HookPipeline::new();
        pipeline
            .register(Some("Person"), HookEvent::BeforeCreate, recorder(&log, "A"))
            .register(Some("Other"), HookEvent::BeforeCreate, recorder(&log, "X"))
            .register(None, HookEvent::BeforeCreate, recorder(&log, "B"))
            .register(Some("Person"), HookEvent::AfterCreate, recorder(&log, "C"));
        let mut o = object(HookEvent::BeforeCreate);
        pipeline.run_before(&mut o).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
        pipeline.run_after(&mut o, None).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(o.phase(), MutationPhase::Complete);
    }

    #[tokio::test]
    async fn before_failure_becomes_abort_and_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = HookPipeline::new();
        pipeline
            .register(None, HookEvent::BeforeUpdate, Arc::new(FnHook::new("guard", |_o: &mut HookObject| {
                Err(AppError::Validation("nope".into()))
            })))
            .register(None, HookEvent::BeforeUpdate, recorder(&log, "later"));
        let err = pipeline.run_before(&mut object(HookEvent::BeforeUpdate)).await.unwrap_err();
        assert!(matches!(err, AppError::HookAbort { ref hook, .. } if hook == "guard"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hooks_can_rewrite_incoming_data() {
        let mut pipeline = HookPipeline::new();
        pipeline.register(
            None,
            HookEvent::BeforeCreate,
            Arc::new(FnHook::new("slug", |o: &mut HookObject| {
                if o.is_field_update("name") {
                    let slug = o.new_data()["name"].as_str().unwrap_or_default().to_lowercase();
                    o.upsert_new_data("slug", json!(slug));
                }
                Ok(())
            })),
        );
        let mut o = object(HookEvent::BeforeCreate);
        pipeline.run_before(&mut o).await.unwrap();
        assert_eq!(o.new_data()["slug"], json!("lucas"));
        assert!(!o.is_field_update("age"));
    }

    #[tokio::test]
    async fn after_failure_is_reported_as_hook_failed() {
        let mut pipeline = HookPipeline::new();
        pipeline.register(
            None,
            HookEvent::AfterDelete,
            Arc::new(FnHook::new("audit", |_o: &mut HookObject| Err(AppError::Connection("down".into())))),
        );
        let mut o = object(HookEvent::BeforeDelete);
        let err = pipeline.run_after(&mut o, None).await.unwrap_err();
        assert!(matches!(err, AppError::HookFailed { .. }));
        assert_eq!(o.event, HookEvent::AfterDelete);
    }
}
