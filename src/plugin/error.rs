//! Captures the failures of effects in a bookkeeping model registered
//! under `error` (by default):
//!
//! ```text
//! {
//!   global: { error, value },
//!   models: { [namespace]: { error, value } },
//!   effects: { [namespace]: { [effect]: { error, value } } },
//! }
//! ```
//!
//! `error` is the message of the latest failure (or `null`), and
//! `value` whether (or with `asNumber`, how many) failures are
//! recorded. A failure is cleared when the effect is called again.
//! Every failure is logged and handed back to the caller.

use super::{
    scope::{seed_state, update, write_entry, Entry, Scope, ScopeConfig},
    Plugin, PluginContext,
};
use crate::{action::action_type, dispatcher::StoreSlot, Dispatcher, Error, Model, Result, StoreRef, Value};
use std::{any::Any, cell::RefCell, collections::HashMap, rc::Rc};

#[derive(Clone, Default)]
struct Record {
    error: Option<Error>,
    /// Never negative.
    value: i64,
    /// When `error` was recorded.
    stamp: u64,
}

impl Record {
    fn expose(&self, scope: &Scope) -> Value {
        Value::object()
            .with("error", self.error.as_ref().map(ToString::to_string))
            .with("value", scope.expose(self.value))
    }

    /// Release `count` failures. Whatever remains is reported by the
    /// `latest` failure still recorded below this level.
    fn release(&mut self, count: i64, latest: Option<(u64, Error)>) {
        self.value = (self.value - count).max(0);
        match latest {
            Some((stamp, error)) if self.value > 0 => {
                self.error = Some(error);
                self.stamp = stamp;
            }
            _ => {
                self.error = None;
                self.stamp = 0;
            }
        }
    }
}

#[derive(Default)]
struct Records {
    clock: u64,
    global: Record,
    models: HashMap<String, Record>,
    effects: HashMap<String, Record>,
}

impl Records {
    /// Clear the failures of the effect `effect_type`, returning whether
    /// there were any.
    fn clear(&mut self, namespace: &str, effect_type: &str) -> bool {
        let cleared = match self.effects.get_mut(effect_type) {
            Some(effect) if effect.value > 0 || effect.error.is_some() => {
                let count = effect.value;
                *effect = Record::default();
                count
            }
            _ => return false,
        };
        let prefix = action_type(namespace, "");
        let model_latest = self.latest(|effect| effect.starts_with(&prefix));
        let global_latest = self.latest(|_| true);
        self.models
            .entry(namespace.to_string())
            .or_default()
            .release(cleared, model_latest);
        self.global.release(cleared, global_latest);
        true
    }

    /// The most recent failure among the effects selected by `filter`.
    fn latest<F: Fn(&str) -> bool>(&self, filter: F) -> Option<(u64, Error)> {
        self.effects
            .iter()
            .filter(|(effect, record)| record.value > 0 && filter(effect.as_str()))
            .filter_map(|(_, record)| record.error.clone().map(|error| (record.stamp, error)))
            .max_by_key(|(stamp, _)| *stamp)
    }

    fn record(&mut self, namespace: &str, action_type: &str, error: &Error) {
        self.clock += 1;
        let stamp = self.clock;
        for record in vec![
            &mut self.global,
            self.models.entry(namespace.to_string()).or_default(),
            self.effects.entry(action_type.to_string()).or_default(),
        ] {
            record.error = Some(error.clone());
            record.value += 1;
            record.stamp = stamp;
        }
    }

    fn entry(&self, scope: &Scope, namespace: &str, action_type: &str) -> Entry {
        let expose = |record: Option<&Record>| record.cloned().unwrap_or_default().expose(scope);
        Entry {
            global: self.global.expose(scope),
            model: expose(self.models.get(namespace)),
            effect: expose(self.effects.get(action_type)),
        }
    }
}

/// Records the failures of every effect in scope.
pub struct ErrorPlugin {
    scope: Rc<Scope>,
    records: Rc<RefCell<Records>>,
    seeds: Vec<(String, Vec<String>)>,
}

impl ErrorPlugin {
    pub const DEFAULT_NAMESPACE: &'static str = "error";

    pub fn new(config: ScopeConfig) -> Result<Self> {
        Ok(Self {
            scope: Rc::new(config.validate("error", Self::DEFAULT_NAMESPACE)?),
            records: Rc::default(),
            seeds: Vec::new(),
        })
    }
}

impl Plugin for ErrorPlugin {
    fn name(&self) -> &str {
        "error"
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
            let empty = Record::default().expose(&self.scope);
            model.set_state(seed_state(&self.seeds, &empty));
            return Ok(());
        }
        if context.is_bookkeeping(namespace) {
            return Ok(());
        }

        let effects = context.dispatch().effect_names(namespace);
        for name in &effects {
            let in_scope = self.scope.includes(&action_type(namespace, name));
            context.dispatch().update(namespace, name, |inner| {
                capture(
                    inner,
                    context.store().clone(),
                    self.records.clone(),
                    self.scope.clone(),
                    in_scope,
                    namespace,
                    name,
                )
            });
        }
        self.seeds.push((namespace.to_string(), effects));
        Ok(())
    }

    fn on_store_created(&mut self, _store: &StoreRef) -> Result<Option<Rc<dyn Any>>> {
        Ok(Some(Rc::new(Errors {
            records: self.records.clone(),
        })))
    }
}

/// Failures outside of the scope are still logged and returned.
fn capture(
    inner: &Dispatcher,
    slot: StoreSlot,
    records: Rc<RefCell<Records>>,
    scope: Rc<Scope>,
    in_scope: bool,
    namespace: &str,
    name: &str,
) -> Dispatcher {
    let namespace = namespace.to_string();
    let name = name.to_string();
    let action_type = inner.action_type().to_string();

    inner.wrap(move |inner, payload, meta| {
        let call = inner.call_with_meta(payload, meta);
        let (slot, records, scope) = (slot.clone(), records.clone(), scope.clone());
        let (namespace, name, action_type) = (namespace.clone(), name.clone(), action_type.clone());

        Box::pin(async move {
            if in_scope && records.borrow_mut().clear(&namespace, &action_type) {
                let hide = records.borrow().entry(&scope, &namespace, &action_type);
                update(&slot, &scope, "hide", hide.into_payload(&namespace, &name)).await;
            }

            let result = call.await;

            if let Err(error) = &result {
                log::error!("{}", error);
                if in_scope {
                    records.borrow_mut().record(&namespace, &action_type, error);
                    let show = records.borrow().entry(&scope, &namespace, &action_type);
                    update(&slot, &scope, "show", show.into_payload(&namespace, &name)).await;
                }
            }

            result
        })
    })
}

/// Read access to the recorded failures, attached to the store; see
/// [Store::extension()](crate::Store::extension()).
pub struct Errors {
    records: Rc<RefCell<Records>>,
}

impl Errors {
    /// The latest failure of any effect, unless it has been cleared.
    pub fn global(&self) -> Option<Error> {
        self.records.borrow().global.error.clone()
    }

    pub fn model(&self, namespace: &str) -> Option<Error> {
        self.records
            .borrow()
            .models
            .get(namespace)
            .and_then(|record| record.error.clone())
    }

    pub fn effect(&self, namespace: &str, name: &str) -> Option<Error> {
        self.records
            .borrow()
            .effects
            .get(&action_type(namespace, name))
            .and_then(|record| record.error.clone())
    }

    /// Number of failures recorded for any effect.
    pub fn count(&self) -> i64 {
        self.records.borrow().global.value
    }
}

#[cfg(test)]
mod tests {
    use super::Errors;
    use crate::{create_store, plugin::scope::ScopeConfig, Model, StoreConfig, StoreRef, Value};
    use anyhow::anyhow;
    use futures::executor::block_on;
    use serde_json::json;

    fn flaky() -> Model {
        flaky_with("timeout")
    }

    /// Fails with `message` while its state is `true`.
    fn flaky_with(message: &'static str) -> Model {
        Model::with_state(true)
            .reducer("heal", |_, _, _| Value::from(false))
            .effect("fetch", move |_, context| async move {
                if context.state().as_bool().unwrap_or(false) {
                    Err(anyhow!(message))
                } else {
                    Ok(Value::from("data"))
                }
            })
    }

    fn record(store: &StoreRef, path: &[&str]) -> Value {
        store.state().at(&["error"]).and_then(|e| e.at(path)).cloned().unwrap_or_default()
    }

    #[test]
    fn failures_are_recorded_and_rethrown() {
        let store = create_store(vec![("api", flaky())], StoreConfig::new()).unwrap();

        let error = block_on(store.call("api", "fetch", Value::Null)).unwrap_err();
        assert_eq!(Some("api/fetch"), error.effect_action());

        assert_eq!(Value::from(true), record(&store, &["effects", "api", "fetch", "value"]));
        assert!(record(&store, &["effects", "api", "fetch", "error"])
            .as_str()
            .unwrap()
            .contains("timeout"));
        assert_eq!(Value::from(true), record(&store, &["models", "api", "value"]));
        assert_eq!(Value::from(true), record(&store, &["global", "value"]));

        let errors = store.extension::<Errors>().unwrap();
        assert_eq!(Some("api/fetch"), errors.effect("api", "fetch").unwrap().effect_action());
        assert_eq!(1, errors.count());
    }

    #[test]
    fn next_call_clears_the_failure() {
        let store = create_store(vec![("api", flaky())], StoreConfig::new()).unwrap();

        assert!(block_on(store.call("api", "fetch", Value::Null)).is_err());
        block_on(store.call("api", "heal", Value::Null)).unwrap();
        assert_eq!(Value::from("data"), block_on(store.call("api", "fetch", Value::Null)).unwrap());

        assert_eq!(
            Value::from(json!({"error": null, "value": false})),
            record(&store, &["effects", "api", "fetch"])
        );
        assert_eq!(Value::from(json!({"error": null, "value": false})), record(&store, &["global"]));
        assert!(store.extension::<Errors>().unwrap().global().is_none());
    }

    #[test]
    fn repeated_failures_are_counted() {
        let store = create_store(
            vec![("api", flaky()), ("other", flaky())],
            StoreConfig::new().error(ScopeConfig::new().as_number(true)),
        )
        .unwrap();

        assert!(block_on(store.call("api", "fetch", Value::Null)).is_err());
        assert!(block_on(store.call("other", "fetch", Value::Null)).is_err());
        assert_eq!(Value::from(2), record(&store, &["global", "value"]));
        assert_eq!(Value::from(1), record(&store, &["models", "api", "value"]));

        // Clearing `api/fetch` leaves the failure of `other/fetch`.
        assert!(block_on(store.call("api", "fetch", Value::Null)).is_err());
        assert_eq!(Value::from(2), record(&store, &["global", "value"]));
        assert_eq!(Value::from(1), record(&store, &["effects", "api", "fetch", "value"]));
    }

    #[test]
    fn clearing_one_failure_reports_the_remaining_one() {
        let store = create_store(
            vec![("a", flaky_with("a down")), ("b", flaky_with("b down"))],
            StoreConfig::new(),
        )
        .unwrap();

        assert!(block_on(store.call("b", "fetch", Value::Null)).is_err());
        assert!(block_on(store.call("a", "fetch", Value::Null)).is_err());
        block_on(store.call("a", "heal", Value::Null)).unwrap();
        block_on(store.call("a", "fetch", Value::Null)).unwrap();

        let errors = store.extension::<Errors>().unwrap();
        let global = errors.global().unwrap();
        assert_eq!(Some("b/fetch"), global.effect_action());
        assert!(errors.model("a").is_none());
        assert_eq!(1, errors.count());

        let message = record(&store, &["global", "error"]);
        assert!(message.as_str().unwrap().contains("b down"));
        assert_eq!(Value::from(true), record(&store, &["global", "value"]));
        assert_eq!(
            Value::from(json!({"error": null, "value": false})),
            record(&store, &["models", "a"])
        );
    }

    #[test]
    fn out_of_scope_failures_are_only_rethrown() {
        let store = create_store(
            vec![("api", flaky())],
            StoreConfig::new().error(ScopeConfig::new().blacklist(vec!["api/fetch"])),
        )
        .unwrap();

        assert!(block_on(store.call("api", "fetch", Value::Null)).is_err());
        assert_eq!(Value::from(false), record(&store, &["global", "value"]));
        assert_eq!(0, store.extension::<Errors>().unwrap().count());
    }

    #[test]
    fn state_is_seeded() {
        let store = create_store(vec![("api", flaky())], StoreConfig::new()).unwrap();
        let empty = json!({"error": null, "value": false});
        assert_eq!(
            Value::from(json!({
                "global": empty.clone(),
                "models": {"api": empty.clone()},
                "effects": {"api": {"fetch": empty}},
            })),
            store.get_state("error").unwrap()
        );
    }
}
