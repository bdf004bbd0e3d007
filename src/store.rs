use crate::{
    action::REPLACE,
    dispatcher::{DispatchFuture, DispatchTable, Dispatcher},
    listener::{AsListener, Listener},
    middleware::{compose, Chain, Terminal},
    model::{validate_namespace, Model},
    plugin::{
        self,
        dispatch::DispatchPlugin,
        effects::EffectsPlugin,
        error::ErrorPlugin,
        immer::{ImmerConfig, ImmerPlugin},
        loading::LoadingPlugin,
        scope::ScopeConfig,
        Plugin, PluginContext,
    },
    reducer::{CombinedReducer, ModelReducer, Reducer},
    Action, Error, Result, Value,
};
use std::{
    any::Any,
    cell::{Cell, RefCell},
    ops::Deref,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

/// A [Listener] associated with (listening to) the state of one
/// namespace.
struct ListenerEntry {
    namespace: String,
    listener: Listener,
    active: Rc<Cell<bool>>,
}

/// Returned by [Store::subscribe()], used to stop the subscription.
#[derive(Clone)]
pub struct Subscription {
    active: Rc<Cell<bool>>,
}

impl Subscription {
    /// Stop notifying the listener. Takes effect immediately, even
    /// during a notification round or while a dispatch is in flight.
    pub fn unsubscribe(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Options for [create_store()].
#[derive(Default)]
pub struct StoreConfig {
    plugins: Vec<Box<dyn Plugin>>,
    disable_immer: bool,
    disable_loading: bool,
    disable_error: bool,
    immer: ImmerConfig,
    loading: ScopeConfig,
    error: ScopeConfig,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plugin, after the built-in dispatch and effects
    /// plugins and before the immer, loading and error plugins.
    pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn disable_immer(mut self) -> Self {
        self.disable_immer = true;
        self
    }

    pub fn disable_loading(mut self) -> Self {
        self.disable_loading = true;
        self
    }

    pub fn disable_error(mut self) -> Self {
        self.disable_error = true;
        self
    }

    pub fn immer(mut self, config: ImmerConfig) -> Self {
        self.immer = config;
        self
    }

    pub fn loading(mut self, config: ScopeConfig) -> Self {
        self.loading = config;
        self
    }

    pub fn error(mut self, config: ScopeConfig) -> Self {
        self.error = config;
        self
    }

    /// The plugins of the store, in the order in which they run.
    fn into_plugins(self) -> Result<Vec<Box<dyn Plugin>>> {
        let mut bookkeeping = Vec::new();
        if !self.disable_loading {
            bookkeeping.push(self.loading.namespace_or(LoadingPlugin::DEFAULT_NAMESPACE));
        }
        if !self.disable_error {
            bookkeeping.push(self.error.namespace_or(ErrorPlugin::DEFAULT_NAMESPACE));
        }

        let mut plugins: Vec<Box<dyn Plugin>> =
            vec![Box::new(DispatchPlugin::new()), Box::new(EffectsPlugin::new())];
        plugins.extend(self.plugins);

        if !self.disable_immer {
            let blacklist = self.immer.into_blacklist().unwrap_or(bookkeeping);
            plugins.push(Box::new(ImmerPlugin::new(blacklist)));
        }
        if !self.disable_loading {
            plugins.push(Box::new(LoadingPlugin::new(self.loading)?));
        }
        if !self.disable_error {
            plugins.push(Box::new(ErrorPlugin::new(self.error)?));
        }

        Ok(plugins)
    }
}

/// A wrapper for an [Rc] reference to a [Store].
///
/// This wrapper exists to provide a standard interface for re-useable
/// middleware and other components which may require a long living
/// reference to the store in order to dispatch actions or modify it
/// in some manner that could not be handled by a simple `&Store`.
#[derive(Clone)]
pub struct StoreRef(Rc<Store>);

impl StoreRef {
    /// Dispatch an `Action` through the middleware chain of this
    /// store.
    ///
    /// The returned future resolves to the new state of the namespace
    /// the action is addressed to, or for effects, to the value the
    /// effect produced. Nothing happens until it is polled.
    pub fn dispatch(&self, action: Action) -> DispatchFuture {
        let store = self.clone();
        Box::pin(async move { store.0.chain.run(&store, action).await })
    }

    /// Register a model with this running store. Subscribers of every
    /// namespace are notified once it has been added.
    pub fn add_model<N: Into<String>>(&self, namespace: N, model: Model) -> Result<()> {
        let mut state = self.state();
        {
            let mut plugins = self.plugins.borrow_mut();
            let mut context = self.context.borrow_mut();
            let mut reducer = self.reducer.borrow_mut();
            register(
                namespace.into(),
                model,
                &mut reducer,
                &mut state,
                &mut plugins,
                &mut context,
            )?;
        }
        *self.state.borrow_mut() = state;
        self.commit(&Action::new(REPLACE));
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> Weak<Store> {
        Rc::downgrade(&self.0)
    }
}

impl From<Rc<Store>> for StoreRef {
    fn from(store: Rc<Store>) -> Self {
        StoreRef(store)
    }
}

impl Deref for StoreRef {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for StoreRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// This struct is designed to operate as a central source of truth
/// and global "immutable" state within your application.
///
/// The state is a tree keyed by the namespaces of the registered
/// [Model]s. It can only be modified by dispatching an `Action` via
/// [StoreRef::dispatch()], or one of the generated [Dispatcher]s.
/// These actions are taken by the reducers of the models, and a new
/// state is produced and committed atomically. The previous state is
/// never mutated, and remains as a reference for any element of your
/// application which may rely upon it.
///
/// Listeners can subscribe to changes to the state of a namespace with
/// [Store::subscribe()].
pub struct Store {
    /// The current state of this store.
    state: RefCell<Value>,
    /// The reducers of every registered model.
    reducer: RefCell<CombinedReducer>,
    /// The listeners which are notified of changes to the state of
    /// a namespace, in registration order.
    listeners: RefCell<Vec<ListenerEntry>>,
    /// Middleware contributed by the plugins, around [Store::commit()].
    chain: Chain,
    dispatch: DispatchTable,
    plugins: RefCell<Vec<Box<dyn Plugin>>>,
    context: RefCell<PluginContext>,
    /// Values attached by [Plugin::on_store_created()].
    extensions: RefCell<Vec<Rc<dyn Any>>>,
}

impl Store {
    /// Get the current state of the store.
    ///
    /// Modifications to this state need to be performed by
    /// dispatching an `Action` to the store using
    /// [dispatch()](StoreRef::dispatch()).
    pub fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    /// Get the current state of the model registered under
    /// `namespace`.
    pub fn get_state(&self, namespace: &str) -> Option<Value> {
        self.state.borrow().get(namespace).cloned()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.reducer.borrow().namespaces().map(String::from).collect()
    }

    /// The generated dispatchers of every registered model.
    pub fn dispatch_table(&self) -> DispatchTable {
        self.dispatch.clone()
    }

    pub fn dispatcher(&self, namespace: &str, name: &str) -> Option<Dispatcher> {
        self.dispatch.get(namespace, name)
    }

    /// Call the dispatcher of the reducer/effect `name` on the model
    /// registered under `namespace`.
    pub fn call<P: Into<Value>>(&self, namespace: &str, name: &str, payload: P) -> DispatchFuture {
        self.dispatch.call(namespace, name, payload)
    }

    /// Retrieve a value attached to this store by a plugin.
    pub fn extension<T: Any>(&self) -> Option<Rc<T>> {
        self.extensions
            .borrow()
            .iter()
            .find_map(|extension| extension.clone().downcast::<T>().ok())
    }

    /// Subscribe a [Listener] to changes of the state of the model
    /// registered under `namespace`. The listener is invoked with the
    /// new state of the namespace every time a dispatched action
    /// changes it.
    ///
    /// A listener made from a borrowed [Callback](crate::Callback) is
    /// a weak reference; when the callback is dropped, the listener
    /// will be removed from this store.
    pub fn subscribe<L: AsListener>(&self, namespace: &str, listener: L) -> Subscription {
        let active = Rc::new(Cell::new(true));
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|entry| entry.active.get());
        listeners.push(ListenerEntry {
            namespace: namespace.to_string(),
            listener: listener.as_listener(),
            active: active.clone(),
        });
        Subscription { active }
    }

    /// Apply `action` to the reducers, commit the resulting state and
    /// notify the listeners of every namespace which changed. Returns
    /// the new state of the namespace the action is addressed to.
    pub(crate) fn commit(&self, action: &Action) -> Value {
        let prev_state = self.state();
        let result = self.reducer.borrow().reduce(&prev_state, action);
        *self.state.borrow_mut() = result.state.clone();
        log::trace!("reduced `{}`, changed {:?}", action.action_type, result.events);

        if !result.events.is_empty() {
            self.notify_listeners(&result.state, &result.events);
        }

        action
            .namespace()
            .and_then(|namespace| result.state.get(namespace))
            .cloned()
            .unwrap_or_default()
    }

    /// Notify the listeners of the namespaces in `events`. A panicking
    /// listener does not prevent the others from being notified.
    fn notify_listeners(&self, state: &Value, events: &[String]) {
        let targets: Vec<(Rc<Cell<bool>>, Listener, String)> = self
            .listeners
            .borrow()
            .iter()
            .filter(|entry| events.contains(&entry.namespace))
            .map(|entry| (entry.active.clone(), entry.listener.clone(), entry.namespace.clone()))
            .collect();

        let mut remove_inactive = false;
        for (active, listener, namespace) in targets {
            if !active.get() {
                remove_inactive = true;
                continue;
            }

            match listener.as_callback() {
                Some(callback) => {
                    let slice = state.get(&namespace).cloned().unwrap_or_default();
                    if panic::catch_unwind(AssertUnwindSafe(|| callback.emit(&slice))).is_err() {
                        log::error!("a listener of `{}` panicked", namespace);
                    }
                }
                None => {
                    active.set(false);
                    remove_inactive = true;
                }
            }
        }

        if remove_inactive {
            self.listeners.borrow_mut().retain(|entry| entry.active.get());
        }
    }
}

/// Create a [Store] with the given models, keyed by the namespace
/// they are registered under.
///
/// Fails if a namespace is registered twice, if a model or plugin is
/// malformed, or if the plugin configuration is invalid.
pub fn create_store<N, I>(models: I, config: StoreConfig) -> Result<StoreRef>
where
    N: Into<String>,
    I: IntoIterator<Item = (N, Model)>,
{
    let mut plugins = config.into_plugins()?;
    plugin::validate(&plugins)?;

    let mut context = PluginContext::new();
    for plugin in plugins.iter_mut() {
        plugin.on_init(&mut context)?;
    }

    let mut reducer = CombinedReducer::new(context.reduce_strategy());
    let mut state = Value::object();
    let models: Vec<(String, Model)> = models
        .into_iter()
        .map(|(namespace, model)| (namespace.into(), model))
        .collect();
    let bookkeeping = context.take_queued();

    for (namespace, model) in models.into_iter().chain(bookkeeping) {
        register(namespace, model, &mut reducer, &mut state, &mut plugins, &mut context)?;
    }

    let middleware = plugins.iter().filter_map(|plugin| plugin.middleware()).collect();
    let terminal: Terminal = Rc::new(|store: &StoreRef, action: Action| -> DispatchFuture {
        let store = store.clone();
        Box::pin(async move { Ok(store.commit(&action)) })
    });

    let store = StoreRef(Rc::new(Store {
        state: RefCell::new(state),
        reducer: RefCell::new(reducer),
        listeners: RefCell::new(Vec::new()),
        chain: compose(middleware, terminal),
        dispatch: context.dispatch().clone(),
        plugins: RefCell::new(Vec::new()),
        context: RefCell::new(context),
        extensions: RefCell::new(Vec::new()),
    }));
    store.context.borrow().store().bind(&store);

    for plugin in plugins.iter_mut() {
        if let Some(extension) = plugin.on_store_created(&store)? {
            store.extensions.borrow_mut().push(extension);
        }
    }
    *store.plugins.borrow_mut() = plugins;

    log::debug!("created store with models {:?}", store.namespaces());
    Ok(store)
}

/// Validate `model`, run the `on_model` hook of every plugin on it and
/// merge it into `reducer` and `state`.
fn register(
    namespace: String,
    mut model: Model,
    reducer: &mut CombinedReducer,
    state: &mut Value,
    plugins: &mut [Box<dyn Plugin>],
    context: &mut PluginContext,
) -> Result<()> {
    if reducer.contains(&namespace) {
        return Err(Error::DuplicateNamespace(namespace));
    }
    validate_namespace(&namespace)?;
    model.validate(&namespace)?;

    if let Some((name, _)) = model.reducers().iter().find(|(_, reducer)| reducer.is_draft()) {
        if !context.reduce_strategy().supports_drafts(&namespace) {
            return Err(Error::invalid_model(
                &namespace,
                format!(
                    "draft reducer `{}` requires the immer plugin to be enabled for this model",
                    name
                ),
            ));
        }
    }

    for plugin in plugins.iter_mut() {
        plugin.on_model(&namespace, &mut model, context)?;
    }

    let model_reducer = ModelReducer::new(&namespace, &model);
    let initial_state = match model.declared_state() {
        Some(declared) => declared.clone(),
        None => model_reducer.initial_state(),
    };
    reducer.push(model_reducer);
    state.insert(namespace.clone(), initial_state);

    log::debug!("registered model `{}`", namespace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{create_store, Callback, Error, Model, StoreConfig, StoreRef, Value};
    use futures::executor::block_on;
    use serde_json::json;
    use std::{cell::RefCell, rc::Rc};

    fn counter() -> Model {
        Model::with_state(json!({"count": 0}))
            .reducer("increment", |state, payload, _| {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                state.clone().with("count", count + payload.as_i64().unwrap_or(1))
            })
            .reducer("reset", |_, _, _| Value::from(json!({"count": 0})))
    }

    fn store() -> StoreRef {
        create_store(vec![("counter", counter()), ("other", Model::with_state(json!({"x": 1})))], StoreConfig::new())
            .unwrap()
    }

    #[test]
    fn dispatch_applies_the_matching_reducer() {
        let store = store();
        let prev = store.get_state("counter").unwrap();
        let expected = match &counter().reducers()["increment"] {
            crate::ReducerFn::Pure(reducer) => reducer(&prev, &Value::from(5), &Value::Null),
            crate::ReducerFn::Draft(_) => unreachable!(),
        };

        let result = block_on(store.dispatch(crate::Action::for_model("counter", "increment").payload(5)));

        assert_eq!(expected, result.unwrap());
        assert_eq!(Some(expected), store.get_state("counter"));
    }

    #[test]
    fn generated_dispatchers_address_their_reducer() {
        let store = store();
        block_on(store.call("counter", "increment", 2)).unwrap();
        block_on(store.dispatcher("counter", "increment").unwrap().call(3)).unwrap();

        assert_eq!(Some(5), store.get_state("counter").unwrap().get("count").and_then(Value::as_i64));
        assert!(!store.dispatcher("counter", "increment").unwrap().is_effect());
    }

    #[test]
    fn unmatched_actions_leave_state_untouched() {
        let store = store();
        let prev = store.state();
        block_on(store.dispatch(crate::Action::for_model("counter", "missing"))).unwrap();
        assert!(store.state().same(&prev));
    }

    #[test]
    fn duplicate_namespaces_fail() {
        let result = create_store(vec![("a", counter()), ("a", counter())], StoreConfig::new());
        assert!(matches!(result, Err(Error::DuplicateNamespace(ref namespace)) if namespace == "a"));

        assert!(create_store(vec![("a", counter()), ("b", counter())], StoreConfig::new()).is_ok());
    }

    #[test]
    fn bookkeeping_namespaces_are_reserved() {
        let result = create_store(vec![("loading", counter())], StoreConfig::new());
        assert!(matches!(result, Err(Error::DuplicateNamespace(_))));
    }

    #[test]
    fn models_without_state_fail() {
        let result = create_store(vec![("empty", Model::new())], StoreConfig::new());
        assert!(matches!(result, Err(Error::InvalidModel { ref namespace, .. }) if namespace == "empty"));
    }

    #[test]
    fn subscribers_are_notified_of_their_namespace() {
        let store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let other_calls = Rc::new(RefCell::new(0));

        let seen_copy = seen.clone();
        store.subscribe(
            "counter",
            Callback::new(move |state: &Value| {
                seen_copy.borrow_mut().push(state.get("count").and_then(Value::as_i64).unwrap_or(-1))
            }),
        );
        let other_copy = other_calls.clone();
        store.subscribe("other", Callback::new(move |_: &Value| *other_copy.borrow_mut() += 1));

        block_on(store.call("counter", "increment", 1)).unwrap();
        block_on(store.call("counter", "increment", 2)).unwrap();

        assert_eq!(vec![1, 3], *seen.borrow());
        assert_eq!(0, *other_calls.borrow());
    }

    #[test]
    fn unsubscribed_listeners_are_not_notified() {
        let store = store();
        let calls = Rc::new(RefCell::new(0));
        let calls_copy = calls.clone();
        let subscription = store.subscribe("counter", Callback::new(move |_: &Value| *calls_copy.borrow_mut() += 1));

        // created before unsubscribing, but not yet polled
        let in_flight = store.call("counter", "increment", 1);
        subscription.unsubscribe();
        block_on(in_flight).unwrap();

        assert_eq!(0, *calls.borrow());
        assert!(!subscription.is_active());
    }

    #[test]
    fn unsubscribing_during_notification_takes_effect_immediately() {
        let store = store();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let later: Rc<RefCell<Option<crate::Subscription>>> = Rc::default();

        let later_copy = later.clone();
        let calls_copy = calls.clone();
        store.subscribe(
            "counter",
            Callback::new(move |_: &Value| {
                calls_copy.borrow_mut().push("first");
                if let Some(subscription) = later_copy.borrow().as_ref() {
                    subscription.unsubscribe();
                }
            }),
        );
        let calls_copy = calls.clone();
        *later.borrow_mut() = Some(store.subscribe(
            "counter",
            Callback::new(move |_: &Value| calls_copy.borrow_mut().push("second")),
        ));

        block_on(store.call("counter", "increment", 1)).unwrap();
        assert_eq!(vec!["first"], *calls.borrow());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let store = store();
        let calls = Rc::new(RefCell::new(0));
        store.subscribe("counter", Callback::new(|_: &Value| panic!("listener failure")));
        let calls_copy = calls.clone();
        store.subscribe("counter", Callback::new(move |_: &Value| *calls_copy.borrow_mut() += 1));

        block_on(store.call("counter", "increment", 1)).unwrap();
        block_on(store.call("counter", "increment", 1)).unwrap();
        assert_eq!(2, *calls.borrow());
    }

    #[test]
    fn weak_listeners_are_dropped_with_their_callback() {
        let store = store();
        let calls = Rc::new(RefCell::new(0));
        let calls_copy = calls.clone();
        let callback = Callback::new(move |_: &Value| *calls_copy.borrow_mut() += 1);
        store.subscribe("counter", &callback);

        block_on(store.call("counter", "increment", 1)).unwrap();
        drop(callback);
        block_on(store.call("counter", "increment", 1)).unwrap();
        assert_eq!(1, *calls.borrow());
    }

    #[test]
    fn added_models_notify_every_subscriber() {
        let store = store();
        let calls = Rc::new(RefCell::new(0));
        let calls_copy = calls.clone();
        store.subscribe("counter", Callback::new(move |_: &Value| *calls_copy.borrow_mut() += 1));

        store
            .add_model(
                "todos",
                Model::with_state(json!([])).reducer("add", |state, payload, _| {
                    let mut state = state.clone();
                    state.push(payload.clone());
                    state
                }),
            )
            .unwrap();

        assert_eq!(1, *calls.borrow());
        assert_eq!(Some(Value::from(json!([]))), store.get_state("todos"));

        block_on(store.call("todos", "add", "write tests")).unwrap();
        assert_eq!(Some(Value::from(json!(["write tests"]))), store.get_state("todos"));

        assert!(matches!(
            store.add_model("todos", Model::with_state(0)),
            Err(Error::DuplicateNamespace(_))
        ));
    }

    #[test]
    fn base_reducer_seeds_the_initial_state() {
        let store = create_store(
            vec![(
                "seen",
                Model::new().base_reducer(|state, action| {
                    Value::from(state.as_i64().unwrap_or(0) + if action.namespace().is_some() { 1 } else { 0 })
                }),
            )],
            StoreConfig::new().disable_loading().disable_error(),
        )
        .unwrap();

        assert_eq!(Some(Value::from(0)), store.get_state("seen"));
        block_on(store.dispatch(crate::Action::for_model("anything", "happened"))).unwrap();
        assert_eq!(Some(Value::from(1)), store.get_state("seen"));
    }

    #[test]
    fn disabled_plugins_leave_their_namespace_to_draft_reducers() {
        let progress = || {
            Model::with_state(json!({"done": 0})).draft_reducer("step", |state, _, _| {
                let done = state.get("done").and_then(Value::as_i64).unwrap_or(0);
                state.insert("done", done + 1);
                None
            })
        };

        let store = create_store(vec![("loading", progress())], StoreConfig::new().disable_loading()).unwrap();
        assert_eq!(Value::from(json!({"done": 1})), block_on(store.call("loading", "step", Value::Null)).unwrap());

        let store = create_store(vec![("error", progress())], StoreConfig::new().disable_error()).unwrap();
        assert_eq!(Value::from(json!({"done": 1})), block_on(store.call("error", "step", Value::Null)).unwrap());
    }
}
