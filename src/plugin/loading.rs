//! Tracks which effects are currently running, in a bookkeeping model
//! registered under `loading` (by default):
//!
//! ```text
//! { global: bool, models: { [namespace]: bool }, effects: { [namespace]: { [effect]: bool } } }
//! ```
//!
//! Overlapping calls of the same effect are counted, so an entry only
//! turns back to `false` once every call has settled.

use super::{
    scope::{seed_state, update, write_entry, Entry, Scope, ScopeConfig},
    Plugin, PluginContext,
};
use crate::{action::action_type, dispatcher::StoreSlot, Action, Dispatcher, Error, Model, Result, StoreRef, Value};
use futures::FutureExt;
use std::{any::Any, cell::RefCell, collections::HashMap, rc::Rc};

#[derive(Default)]
struct Counters {
    global: i64,
    models: HashMap<String, i64>,
    effects: HashMap<String, i64>,
}

impl Counters {
    fn enter(&mut self, namespace: &str, action_type: &str) {
        self.global += 1;
        *self.models.entry(namespace.to_string()).or_default() += 1;
        *self.effects.entry(action_type.to_string()).or_default() += 1;
    }

    /// Never drops below zero, even if an effect settles twice.
    fn leave(&mut self, namespace: &str, action_type: &str) {
        fn decrement(count: &mut i64) {
            *count = (*count - 1).max(0);
        }
        decrement(&mut self.global);
        decrement(self.models.entry(namespace.to_string()).or_default());
        decrement(self.effects.entry(action_type.to_string()).or_default());
    }

    fn entry(&self, scope: &Scope, namespace: &str, action_type: &str) -> Entry {
        Entry {
            global: scope.expose(self.global),
            model: scope.expose(self.models.get(namespace).copied().unwrap_or(0)),
            effect: scope.expose(self.effects.get(action_type).copied().unwrap_or(0)),
        }
    }
}

/// Counts the calls of every effect in scope which are in flight.
pub struct LoadingPlugin {
    scope: Rc<Scope>,
    counters: Rc<RefCell<Counters>>,
    /// The models seen so far, with their effects.
    seeds: Vec<(String, Vec<String>)>,
}

impl LoadingPlugin {
    pub const DEFAULT_NAMESPACE: &'static str = "loading";

    pub fn new(config: ScopeConfig) -> Result<Self> {
        Ok(Self {
            scope: Rc::new(config.validate("loading", Self::DEFAULT_NAMESPACE)?),
            counters: Rc::default(),
            seeds: Vec::new(),
        })
    }
}

impl Plugin for LoadingPlugin {
    fn name(&self) -> &str {
        "loading"
    }

    fn on_init(&mut self, context: &mut PluginContext) -> Result<()> {
        context.add_model(
            self.scope.namespace(),
            Model::with_state(Value::Null)
                .reducer("show", write_entry)
                .reducer("hide", write_entry),
        );
        Ok(())
    }

    fn on_model(&mut self, namespace: &str, model: &mut Model, context: &mut PluginContext) -> Result<()> {
        if namespace == self.scope.namespace() {
            model.set_state(seed_state(&self.seeds, &self.scope.expose(0)));
            return Ok(());
        }
        if context.is_bookkeeping(namespace) {
            return Ok(());
        }

        let effects = context.dispatch().effect_names(namespace);
        for name in &effects {
            if !self.scope.includes(&action_type(namespace, name)) {
                continue;
            }
            context.dispatch().update(namespace, name, |inner| {
                track(
                    inner,
                    context.store().clone(),
                    self.counters.clone(),
                    self.scope.clone(),
                    namespace,
                    name,
                )
            });
        }
        self.seeds.push((namespace.to_string(), effects));
        Ok(())
    }

    fn on_store_created(&mut self, _store: &StoreRef) -> Result<Option<Rc<dyn Any>>> {
        Ok(Some(Rc::new(Loading {
            counters: self.counters.clone(),
        })))
    }
}

fn track(
    inner: &Dispatcher,
    slot: StoreSlot,
    counters: Rc<RefCell<Counters>>,
    scope: Rc<Scope>,
    namespace: &str,
    name: &str,
) -> Dispatcher {
    let namespace = namespace.to_string();
    let name = name.to_string();
    let action_type = inner.action_type().to_string();

    inner.wrap(move |inner, payload, meta| {
        let call = inner.call_with_meta(payload, meta);
        let mut in_flight = InFlight {
            slot: slot.clone(),
            counters: counters.clone(),
            scope: scope.clone(),
            namespace: namespace.clone(),
            name: name.clone(),
            action_type: action_type.clone(),
            pending: false,
        };

        Box::pin(async move {
            let show = in_flight.enter();
            update(&in_flight.slot, &in_flight.scope, "show", show).await;

            let result = call.await;

            let hide = in_flight.settle();
            update(&in_flight.slot, &in_flight.scope, "hide", hide).await;

            result
        })
    })
}

/// One tracked call. A call which is dropped after it started and
/// before it completed is settled when its `InFlight` is dropped.
struct InFlight {
    slot: StoreSlot,
    counters: Rc<RefCell<Counters>>,
    scope: Rc<Scope>,
    namespace: String,
    name: String,
    action_type: String,
    /// Entered and not yet settled.
    pending: bool,
}

impl InFlight {
    fn enter(&mut self) -> Value {
        self.pending = true;
        let mut counters = self.counters.borrow_mut();
        counters.enter(&self.namespace, &self.action_type);
        counters
            .entry(&self.scope, &self.namespace, &self.action_type)
            .into_payload(&self.namespace, &self.name)
    }

    fn settle(&mut self) -> Value {
        self.pending = false;
        let mut counters = self.counters.borrow_mut();
        counters.leave(&self.namespace, &self.action_type);
        counters
            .entry(&self.scope, &self.namespace, &self.action_type)
            .into_payload(&self.namespace, &self.name)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let hide = self.settle();
        let action = Action::for_model(self.scope.namespace(), "hide").payload(hide);
        // Bookkeeping reducers commit on the first poll unless a
        // middleware holds the action back.
        match self.slot.dispatch(action).now_or_never() {
            Some(Ok(_)) | Some(Err(Error::StoreDropped)) => {}
            Some(Err(error)) => log::warn!("could not update `{}`: {}", self.scope.namespace(), error),
            None => log::warn!(
                "`{}` was dropped in flight and `{}` could not be updated",
                self.action_type,
                self.scope.namespace()
            ),
        }
    }
}

/// Read access to the loading counters, attached to the store; see
/// [Store::extension()](crate::Store::extension()).
pub struct Loading {
    counters: Rc<RefCell<Counters>>,
}

impl Loading {
    /// Number of effect calls in flight.
    pub fn global(&self) -> i64 {
        self.counters.borrow().global
    }

    pub fn model(&self, namespace: &str) -> i64 {
        self.counters.borrow().models.get(namespace).copied().unwrap_or(0)
    }

    pub fn effect(&self, namespace: &str, name: &str) -> i64 {
        self.counters
            .borrow()
            .effects
            .get(&action_type(namespace, name))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_loading(&self) -> bool {
        self.global() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::Loading;
    use crate::{create_store, plugin::scope::ScopeConfig, Error, Model, StoreConfig, StoreRef, Value};
    use anyhow::anyhow;
    use futures::{executor::block_on, poll};
    use serde_json::json;
    use std::time::Duration;

    fn sleep_then(ms: u64) -> Model {
        Model::with_state(0)
            .effect("wait", move |_, _| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::Null)
            })
            .effect("fail", |_, _| async { Err(anyhow!("offline")) })
            .effect("other", |_, _| async { Ok(Value::Null) })
    }

    fn loading(store: &StoreRef, path: &[&str]) -> Value {
        store.state().at(&["loading"]).and_then(|l| l.at(path)).cloned().unwrap_or_default()
    }

    #[test]
    fn state_is_seeded_for_every_effect() {
        let store = create_store(vec![("data", sleep_then(1))], StoreConfig::new()).unwrap();
        assert_eq!(
            Value::from(json!({
                "global": false,
                "models": {"data": false},
                "effects": {"data": {"fail": false, "other": false, "wait": false}},
            })),
            store.get_state("loading").unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_calls_are_counted() {
        let store = create_store(vec![("data", sleep_then(100))], StoreConfig::new()).unwrap();

        let mut first = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut first).is_pending());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut second = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut second).is_pending());

        assert_eq!(Value::from(true), loading(&store, &["effects", "data", "wait"]));
        assert_eq!(2, store.extension::<Loading>().unwrap().effect("data", "wait"));

        first.await.unwrap();
        assert_eq!(Value::from(true), loading(&store, &["effects", "data", "wait"]));
        assert_eq!(Value::from(true), loading(&store, &["global"]));

        second.await.unwrap();
        assert_eq!(Value::from(false), loading(&store, &["effects", "data", "wait"]));
        assert_eq!(Value::from(false), loading(&store, &["models", "data"]));
        assert_eq!(Value::from(false), loading(&store, &["global"]));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_settles_its_counter() {
        let store = create_store(vec![("data", sleep_then(100))], StoreConfig::new()).unwrap();

        let mut call = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut call).is_pending());
        assert_eq!(Value::from(true), loading(&store, &["global"]));

        drop(call);
        assert_eq!(0, store.extension::<Loading>().unwrap().global());
        assert_eq!(Value::from(false), loading(&store, &["effects", "data", "wait"]));
        assert_eq!(Value::from(false), loading(&store, &["models", "data"]));
        assert_eq!(Value::from(false), loading(&store, &["global"]));

        // An unpolled call never entered, so dropping it changes nothing.
        let mut running = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut running).is_pending());
        drop(store.call("data", "wait", Value::Null));
        assert_eq!(1, store.extension::<Loading>().unwrap().effect("data", "wait"));
        running.await.unwrap();
        assert_eq!(Value::from(false), loading(&store, &["global"]));
    }

    fn counter() -> Model {
        Model::with_state(json!({"count": 0}))
            .reducer("increment", |state, payload, _| {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                Value::object().with("count", count + payload.as_i64().unwrap_or(1))
            })
            .effect("asyncIncrement", |payload, context| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                context.dispatch("increment", payload).await?;
                Ok(Value::Null)
            })
    }

    #[tokio::test(start_paused = true)]
    async fn async_increment_is_loading_while_delayed() {
        let store = create_store(vec![("count", counter())], StoreConfig::new()).unwrap();

        let mut call = store.call("count", "asyncIncrement", 5);
        assert!(poll!(&mut call).is_pending());
        assert_eq!(Value::from(true), loading(&store, &["effects", "count", "asyncIncrement"]));
        assert_eq!(Value::from(true), loading(&store, &["global"]));
        assert_eq!(Some(0), store.get_state("count").and_then(|s| s.get("count").and_then(Value::as_i64)));

        call.await.unwrap();
        assert_eq!(Value::from(false), loading(&store, &["effects", "count", "asyncIncrement"]));
        assert_eq!(Value::from(false), loading(&store, &["models", "count"]));
        assert_eq!(Value::from(false), loading(&store, &["global"]));
        assert_eq!(Some(5), store.get_state("count").and_then(|s| s.get("count").and_then(Value::as_i64)));
    }

    #[tokio::test(start_paused = true)]
    async fn effect_body_sees_itself_loading() {
        let watcher = Model::with_state(0).effect("observe", |_, context| async move {
            let state = context.store_state();
            Ok(Value::object()
                .with("effect", state.at(&["loading", "effects", "watcher", "observe"]).cloned().unwrap_or_default())
                .with("global", state.at(&["loading", "global"]).cloned().unwrap_or_default()))
        });
        let store = create_store(vec![("watcher", watcher)], StoreConfig::new()).unwrap();

        let seen = store.call("watcher", "observe", Value::Null).await.unwrap();
        assert_eq!(Value::from(json!({"effect": true, "global": true})), seen);
        assert_eq!(Value::from(false), loading(&store, &["effects", "watcher", "observe"]));
    }

    #[test]
    fn failing_effect_settles_its_counter() {
        let store = create_store(
            vec![("data", sleep_then(1))],
            StoreConfig::new().loading(ScopeConfig::new().as_number(true)),
        )
        .unwrap();

        assert!(block_on(store.call("data", "fail", Value::Null)).is_err());
        assert_eq!(Value::from(0), loading(&store, &["effects", "data", "fail"]));
        assert_eq!(Value::from(0), loading(&store, &["global"]));
    }

    #[tokio::test(start_paused = true)]
    async fn counts_are_exposed_as_numbers() {
        let store = create_store(
            vec![("data", sleep_then(10))],
            StoreConfig::new().loading(ScopeConfig::new().as_number(true)),
        )
        .unwrap();

        let mut first = store.call("data", "wait", Value::Null);
        let mut second = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut first).is_pending());
        assert!(poll!(&mut second).is_pending());
        assert_eq!(Value::from(2), loading(&store, &["effects", "data", "wait"]));
        assert_eq!(Value::from(2), loading(&store, &["models", "data"]));

        futures::future::try_join(first, second).await.unwrap();
        assert_eq!(Value::from(0), loading(&store, &["global"]));
    }

    #[tokio::test(start_paused = true)]
    async fn only_whitelisted_effects_are_tracked() {
        let store = create_store(
            vec![("data", sleep_then(10))],
            StoreConfig::new()
                .loading(ScopeConfig::new().name("busy").whitelist(vec!["data/other"])),
        )
        .unwrap();

        let mut wait = store.call("data", "wait", Value::Null);
        assert!(poll!(&mut wait).is_pending());
        assert_eq!(
            Some(Value::from(false)),
            store.state().at(&["busy", "effects", "data", "wait"]).cloned()
        );
        assert!(!store.extension::<Loading>().unwrap().is_loading());
        wait.await.unwrap();
    }

    #[test]
    fn conflicting_lists_fail_construction() {
        let result = create_store(
            vec![("data", sleep_then(1))],
            StoreConfig::new().loading(ScopeConfig::new().whitelist(vec!["data/wait"]).blacklist(vec!["data/fail"])),
        );
        assert!(matches!(result, Err(Error::InvalidConfig { ref plugin, .. }) if plugin == "loading"));
    }

    #[test]
    fn can_be_disabled() {
        let store = create_store(vec![("data", sleep_then(1))], StoreConfig::new().disable_loading()).unwrap();
        assert_eq!(None, store.get_state("loading"));
        assert!(store.extension::<Loading>().is_none());
    }
}
