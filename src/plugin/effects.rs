//! Asynchronous effects. An effect is dispatched like a reducer: its
//! action first travels the rest of the middleware chain (so a reducer
//! of the same name has already updated the state), and then the
//! effect body runs with an [EffectContext].

use super::{Plugin, PluginContext};
use crate::{
    action::action_type,
    dispatcher::{DispatchFuture, Dispatcher, DispatcherKind},
    middleware::{Middleware, Next},
    model::{validate_name, Effect},
    Action, Error, Model, Result, StoreRef, Value,
};
use futures::future;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    sync::Arc,
};

#[derive(Clone)]
struct RegisteredEffect {
    namespace: Rc<str>,
    effect: Effect,
    /// Number of calls started so far.
    sequence: Rc<Cell<u64>>,
}

/// Every effect registered with a store, keyed by action type.
#[derive(Clone, Default)]
pub struct EffectRegistry(Rc<RefCell<HashMap<String, RegisteredEffect>>>);

impl EffectRegistry {
    pub fn contains(&self, action_type: &str) -> bool {
        self.0.borrow().contains_key(action_type)
    }

    pub fn action_types(&self) -> Vec<String> {
        let mut action_types: Vec<String> = self.0.borrow().keys().cloned().collect();
        action_types.sort();
        action_types
    }

    fn insert(&self, namespace: &str, name: &str, effect: Effect) {
        self.0.borrow_mut().insert(
            action_type(namespace, name),
            RegisteredEffect {
                namespace: namespace.into(),
                effect,
                sequence: Rc::default(),
            },
        );
    }

    fn get(&self, action_type: &str) -> Option<RegisteredEffect> {
        self.0.borrow().get(action_type).cloned()
    }
}

/// Registers the effects of every model and runs them when their
/// action is dispatched.
#[derive(Default)]
pub struct EffectsPlugin {
    registry: EffectRegistry,
}

impl EffectsPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for EffectsPlugin {
    fn name(&self) -> &str {
        "effects"
    }

    fn on_init(&mut self, context: &mut PluginContext) -> Result<()> {
        context.set_effects(self.registry.clone());
        Ok(())
    }

    fn on_model(&mut self, namespace: &str, model: &mut Model, context: &mut PluginContext) -> Result<()> {
        let effects = match model.effects() {
            Some(effects) => effects.resolve(namespace, context.dispatch())?,
            None => return Ok(()),
        };
        for name in effects.keys() {
            validate_name(namespace, "effect", name)?;
        }

        for (name, effect) in effects {
            self.registry.insert(namespace, &name, effect);
            context.dispatch().insert(
                namespace,
                &name,
                Dispatcher::for_action(context.store(), namespace, &name, DispatcherKind::Effect),
            );
        }
        Ok(())
    }

    fn middleware(&self) -> Option<Rc<dyn Middleware>> {
        Some(Rc::new(EffectsMiddleware {
            registry: self.registry.clone(),
        }))
    }
}

struct EffectsMiddleware {
    registry: EffectRegistry,
}

impl Middleware for EffectsMiddleware {
    fn on_dispatch(&self, store: &StoreRef, action: Action, next: Next) -> DispatchFuture {
        let registered = match self.registry.get(&action.action_type) {
            Some(registered) => registered,
            None => return next.run(action),
        };

        let store = store.clone();
        Box::pin(async move {
            let sequence = registered.sequence.get() + 1;
            registered.sequence.set(sequence);

            let payload = action.payload.clone();
            let meta = action.meta.clone();
            let action_type = action.action_type.clone();
            next.run(action).await?;

            let context = EffectContext {
                root_state: store.state(),
                store,
                namespace: registered.namespace.clone(),
                meta,
                sequence,
                latest: registered.sequence.clone(),
                latest_only: registered.effect.is_latest_only(),
            };
            registered
                .effect
                .run(payload, context)
                .await
                .map_err(|cause| Error::Effect {
                    action: action_type,
                    cause: Arc::new(cause),
                })
        })
    }
}

/// What an effect body can see and do.
#[derive(Clone)]
pub struct EffectContext {
    store: StoreRef,
    namespace: Rc<str>,
    meta: Value,
    root_state: Value,
    sequence: u64,
    latest: Rc<Cell<u64>>,
    latest_only: bool,
}

impl EffectContext {
    /// The namespace of the model declaring the effect.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The meta of the action which started the effect.
    pub fn meta(&self) -> &Value {
        &self.meta
    }

    /// The root state at the time the effect started.
    pub fn root_state(&self) -> &Value {
        &self.root_state
    }

    /// The current state of the model declaring the effect.
    pub fn state(&self) -> Value {
        self.store.get_state(&self.namespace).unwrap_or_default()
    }

    /// The current root state.
    pub fn store_state(&self) -> Value {
        self.store.state()
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    /// Dispatch the reducer or effect `name` of the model declaring
    /// the effect.
    pub fn dispatch<P: Into<Value>>(&self, name: &str, payload: P) -> DispatchFuture {
        let namespace = self.namespace.clone();
        self.dispatch_to(&namespace, name, payload)
    }

    /// Dispatch the reducer or effect `name` of the model registered
    /// under `namespace`.
    ///
    /// For a latest-only effect which has been superseded by a newer
    /// call, nothing is dispatched and this resolves to
    /// [Value::Null].
    pub fn dispatch_to<P: Into<Value>>(&self, namespace: &str, name: &str, payload: P) -> DispatchFuture {
        if self.latest_only && !self.is_latest() {
            log::debug!(
                "suppressing `{}` from superseded call {} of a `{}` effect",
                action_type(namespace, name),
                self.sequence,
                self.namespace
            );
            return Box::pin(future::ready(Ok(Value::Null)));
        }
        self.store.dispatch_table().call(namespace, name, payload)
    }

    /// Which call of the effect this is, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether no newer call of the effect has started since this one.
    pub fn is_latest(&self) -> bool {
        self.latest.get() == self.sequence
    }
}
