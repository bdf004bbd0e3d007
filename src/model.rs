use crate::{
    action::SEPARATOR,
    dispatcher::DispatchTable,
    plugin::effects::EffectContext,
    reducer::{BaseReducerFn, ReducerFn},
    Action, Error, Result, Value,
};
use futures::future::LocalBoxFuture;
use std::{collections::BTreeMap, future::Future, rc::Rc};

/// The future produced by an effect body.
pub type EffectFuture = LocalBoxFuture<'static, anyhow::Result<Value>>;

/// An asynchronous effect body: `(payload, context) -> result`.
pub type EffectFn = Rc<dyn Fn(Value, EffectContext) -> EffectFuture>;

/// Produces the effects of a model from the live dispatch table of
/// the store being constructed.
pub type EffectsFactory = Rc<dyn Fn(&DispatchTable) -> anyhow::Result<BTreeMap<String, Effect>>>;

/// Asynchronous business logic declared on a [Model].
#[derive(Clone)]
pub struct Effect {
    body: EffectFn,
    latest_only: bool,
}

impl Effect {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Value, EffectContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        let body: EffectFn = Rc::new(move |payload: Value, context: EffectContext| -> EffectFuture {
            Box::pin(body(payload, context))
        });
        Self {
            body,
            latest_only: false,
        }
    }

    /// Only the most recent call of this effect may dispatch further
    /// actions; calls which have been superseded by a newer call
    /// have their dispatches suppressed.
    pub fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    pub fn is_latest_only(&self) -> bool {
        self.latest_only
    }

    pub fn run(&self, payload: Value, context: EffectContext) -> EffectFuture {
        (self.body)(payload, context)
    }
}

/// The effects declared on a [Model].
#[derive(Clone)]
pub enum Effects {
    Map(BTreeMap<String, Effect>),
    Factory(EffectsFactory),
}

impl Effects {
    /// Produce the effect mapping, invoking the factory if there is
    /// one.
    pub fn resolve(&self, namespace: &str, dispatch: &DispatchTable) -> Result<BTreeMap<String, Effect>> {
        match self {
            Effects::Map(effects) => Ok(effects.clone()),
            Effects::Factory(factory) => factory(dispatch).map_err(|error| {
                Error::invalid_model(namespace, format!("effects factory failed: {:#}", error))
            }),
        }
    }
}

/// A declarative container of state, the reducers which transition it
/// and the effects which run business logic around it. Models are
/// registered with a store under a unique namespace with
/// [create_store()](crate::create_store()).
#[derive(Clone, Default)]
pub struct Model {
    state: Option<Value>,
    base_reducer: Option<Rc<BaseReducerFn>>,
    reducers: BTreeMap<String, ReducerFn>,
    effects: Option<Effects>,
}

impl Model {
    /// A model without any initial state; one must be supplied with
    /// [Model::state()] or [Model::base_reducer()] before it can be
    /// registered.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<S: Into<Value>>(state: S) -> Self {
        Self::new().state(state)
    }

    pub fn state<S: Into<Value>>(mut self, state: S) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn base_reducer<F: Fn(&Value, &Action) -> Value + 'static>(mut self, reducer: F) -> Self {
        self.base_reducer = Some(Rc::new(reducer));
        self
    }

    /// Declare a pure reducer `(state, payload, meta) -> next state`.
    pub fn reducer<N, F>(self, name: N, reducer: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value, &Value, &Value) -> Value + 'static,
    {
        self.reducer_fn(name, ReducerFn::pure(reducer))
    }

    /// Declare a reducer which mutates a draft of the state in place.
    /// Requires the [ImmerPlugin](crate::plugin::immer::ImmerPlugin).
    pub fn draft_reducer<N, F>(self, name: N, reducer: F) -> Self
    where
        N: Into<String>,
        F: Fn(&mut Value, &Value, &Value) -> Option<Value> + 'static,
    {
        self.reducer_fn(name, ReducerFn::draft(reducer))
    }

    pub fn reducer_fn<N: Into<String>>(mut self, name: N, reducer: ReducerFn) -> Self {
        self.reducers.insert(name.into(), reducer);
        self
    }

    /// Declare an effect `(payload, context) -> future`.
    pub fn effect<N, F, Fut>(self, name: N, body: F) -> Self
    where
        N: Into<String>,
        F: Fn(Value, EffectContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.effect_entry(name, Effect::new(body))
    }

    pub fn effect_entry<N: Into<String>>(mut self, name: N, effect: Effect) -> Self {
        let effects = match self.effects.take() {
            Some(Effects::Map(mut effects)) => {
                effects.insert(name.into(), effect);
                effects
            }
            Some(Effects::Factory(_)) => {
                log::warn!("replacing an effects factory with an effect map");
                std::iter::once((name.into(), effect)).collect()
            }
            None => std::iter::once((name.into(), effect)).collect(),
        };
        self.effects = Some(Effects::Map(effects));
        self
    }

    /// Declare the effects of this model through a factory which
    /// receives the live dispatch table of the store.
    pub fn effects_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DispatchTable) -> anyhow::Result<BTreeMap<String, Effect>> + 'static,
    {
        self.effects = Some(Effects::Factory(Rc::new(factory)));
        self
    }

    pub fn declared_state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: Value) {
        self.state = Some(state);
    }

    pub fn base_reducer_fn(&self) -> Option<&Rc<BaseReducerFn>> {
        self.base_reducer.as_ref()
    }

    pub fn reducers(&self) -> &BTreeMap<String, ReducerFn> {
        &self.reducers
    }

    pub fn effects(&self) -> Option<&Effects> {
        self.effects.as_ref()
    }

    pub fn has_draft_reducers(&self) -> bool {
        self.reducers.values().any(ReducerFn::is_draft)
    }

    /// Check the structural rules every model must satisfy before it
    /// can be registered under `namespace`.
    pub(crate) fn validate(&self, namespace: &str) -> Result<()> {
        if self.state.is_none() && self.base_reducer.is_none() {
            return Err(Error::invalid_model(
                namespace,
                "a model requires either a `state` or a `base_reducer`",
            ));
        }
        Ok(())
    }
}

/// Check that a reducer or effect `name` can be addressed with an
/// action type.
pub(crate) fn validate_name(namespace: &str, kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_model(namespace, format!("{} names must not be empty", kind)));
    }
    if name.contains(SEPARATOR) {
        return Err(Error::invalid_model(
            namespace,
            format!("{} name `{}` must not contain `{}`", kind, name, SEPARATOR),
        ));
    }
    Ok(())
}

/// Check that `namespace` can be used to address a model.
pub(crate) fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(Error::invalid_model(namespace, "namespaces must not be empty"));
    }
    if namespace.contains(SEPARATOR) || namespace.starts_with("@@") {
        return Err(Error::invalid_model(
            namespace,
            format!("namespaces must not contain `{}` or start with `@@`", SEPARATOR),
        ));
    }
    Ok(())
}
