//! Plugins extend a [Store](crate::Store) through a fixed set of
//! lifecycle hooks, without knowing about each other. Anything a
//! plugin wants to share with the plugins after it goes through the
//! [PluginContext].
//!
//! The store always runs the [DispatchPlugin](dispatch::DispatchPlugin)
//! and [EffectsPlugin](effects::EffectsPlugin) first, followed by the
//! caller's plugins, and then (unless disabled) the
//! [ImmerPlugin](immer::ImmerPlugin), [LoadingPlugin](loading::LoadingPlugin)
//! and [ErrorPlugin](error::ErrorPlugin).

pub mod dispatch;
pub mod effects;
pub mod error;
pub mod immer;
pub mod loading;
pub mod scope;

use crate::{
    dispatcher::{DispatchTable, StoreSlot},
    middleware::Middleware,
    reducer::{PlainStrategy, ReduceStrategy},
    Error, Model, Result, StoreRef,
};
use effects::EffectRegistry;
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    rc::Rc,
};

/// A bundle of lifecycle hooks extending a [Store](crate::Store).
/// Every hook is optional.
pub trait Plugin {
    /// Identifies the plugin in error messages, must be unique within
    /// a store.
    fn name(&self) -> &str;

    /// Invoked once when the store is being created, before any model
    /// has been registered.
    fn on_init(&mut self, _context: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Invoked once for every model registered with the store, in
    /// plugin order.
    fn on_model(&mut self, _namespace: &str, _model: &mut Model, _context: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Contributes a link to the store's dispatch chain. The position
    /// of the link is the position of the plugin.
    fn middleware(&self) -> Option<Rc<dyn Middleware>> {
        None
    }

    /// Invoked once the store has been assembled. A returned value is
    /// attached to the store, and can be retrieved with
    /// [Store::extension()](crate::Store::extension()).
    fn on_store_created(&mut self, _store: &StoreRef) -> Result<Option<Rc<dyn Any>>> {
        Ok(None)
    }
}

/// The capabilities shared between plugins while a store is being
/// assembled.
pub struct PluginContext {
    store: StoreSlot,
    dispatch: DispatchTable,
    effects: Option<EffectRegistry>,
    strategy: Rc<dyn ReduceStrategy>,
    queued: Vec<(String, Model)>,
    bookkeeping: HashSet<String>,
    exposed: HashMap<String, (String, Rc<dyn Any>)>,
}

impl PluginContext {
    pub(crate) fn new() -> Self {
        Self {
            store: StoreSlot::default(),
            dispatch: DispatchTable::default(),
            effects: None,
            strategy: Rc::new(PlainStrategy),
            queued: Vec::new(),
            bookkeeping: HashSet::new(),
            exposed: HashMap::new(),
        }
    }

    /// The store being assembled; only bound once every model has been
    /// registered.
    pub fn store(&self) -> &StoreSlot {
        &self.store
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn effects(&self) -> Option<&EffectRegistry> {
        self.effects.as_ref()
    }

    pub fn set_effects(&mut self, effects: EffectRegistry) {
        self.effects = Some(effects);
    }

    pub fn reduce_strategy(&self) -> Rc<dyn ReduceStrategy> {
        self.strategy.clone()
    }

    /// Replace how reducers are applied to their slice of the state.
    /// Only takes effect when called from [Plugin::on_init()].
    pub fn set_reduce_strategy(&mut self, strategy: Rc<dyn ReduceStrategy>) {
        self.strategy = strategy;
    }

    /// Register a model owned by a plugin, after the models supplied
    /// by the caller.
    pub fn add_model<N: Into<String>>(&mut self, namespace: N, model: Model) {
        let namespace = namespace.into();
        self.bookkeeping.insert(namespace.clone());
        self.queued.push((namespace, model));
    }

    /// Whether the model registered under `namespace` was added by a
    /// plugin with [PluginContext::add_model()].
    pub fn is_bookkeeping(&self, namespace: &str) -> bool {
        self.bookkeeping.contains(namespace)
    }

    pub(crate) fn take_queued(&mut self) -> Vec<(String, Model)> {
        std::mem::take(&mut self.queued)
    }

    /// Make `value` available to the plugins which run after `plugin`
    /// under `key`.
    pub fn expose<T: Any>(&mut self, plugin: &str, key: &str, value: T) -> Result<()> {
        if let Some((owner, _)) = self.exposed.get(key) {
            return Err(Error::InvalidPlugin {
                plugin: plugin.to_string(),
                hook: "exposed",
                reason: format!("`{}` is already exposed by plugin `{}`", key, owner),
            });
        }
        self.exposed
            .insert(key.to_string(), (plugin.to_string(), Rc::new(value)));
        Ok(())
    }

    pub fn exposed<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        self.exposed
            .get(key)
            .and_then(|(_, value)| value.clone().downcast::<T>().ok())
    }
}

/// Check that every plugin can be told apart from the others.
pub(crate) fn validate(plugins: &[Box<dyn Plugin>]) -> Result<()> {
    let mut names = HashSet::new();
    for plugin in plugins {
        let name = plugin.name();
        if name.is_empty() {
            return Err(Error::InvalidPlugin {
                plugin: name.to_string(),
                hook: "name",
                reason: "plugin names must not be empty".to_string(),
            });
        }
        if !names.insert(name) {
            return Err(Error::InvalidPlugin {
                plugin: name.to_string(),
                hook: "name",
                reason: "another plugin with this name is already installed".to_string(),
            });
        }
    }
    Ok(())
}
