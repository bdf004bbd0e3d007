use crate::{
    action::{Action, INIT, REPLACE},
    model::Model,
    Value,
};
use std::{collections::HashMap, rc::Rc};

/// A pure reducer: `(state, payload, meta) -> next state`.
pub type PureFn = dyn Fn(&Value, &Value, &Value) -> Value;

/// A draft reducer: mutates a scratch copy of the state in place, and
/// optionally returns a replacement for it instead.
pub type DraftFn = dyn Fn(&mut Value, &Value, &Value) -> Option<Value>;

/// A reducer which sees every action dispatched to the store, and
/// produces the initial state of its model when given [Value::Null].
pub type BaseReducerFn = dyn Fn(&Value, &Action) -> Value;

/// A named state transition declared on a [Model].
#[derive(Clone)]
pub enum ReducerFn {
    Pure(Rc<PureFn>),
    Draft(Rc<DraftFn>),
}

impl ReducerFn {
    pub fn pure<F: Fn(&Value, &Value, &Value) -> Value + 'static>(reducer: F) -> Self {
        ReducerFn::Pure(Rc::new(reducer))
    }

    pub fn draft<F: Fn(&mut Value, &Value, &Value) -> Option<Value> + 'static>(reducer: F) -> Self {
        ReducerFn::Draft(Rc::new(reducer))
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, ReducerFn::Draft(_))
    }
}

/// Decides how a [ReducerFn] is applied to the slice of state it
/// owns. The store uses [PlainStrategy] unless a plugin installs
/// another one (see [ImmerPlugin](crate::plugin::immer::ImmerPlugin)).
pub trait ReduceStrategy {
    /// Whether draft reducers may be declared on the model registered
    /// under `namespace`.
    fn supports_drafts(&self, namespace: &str) -> bool;

    /// Only given draft reducers of namespaces which support them;
    /// models declaring any others are rejected on registration.
    fn apply(&self, namespace: &str, reducer: &ReducerFn, state: &Value, action: &Action) -> Value;
}

/// Applies pure reducers only.
pub struct PlainStrategy;

impl ReduceStrategy for PlainStrategy {
    fn supports_drafts(&self, _namespace: &str) -> bool {
        false
    }

    fn apply(&self, _namespace: &str, reducer: &ReducerFn, state: &Value, action: &Action) -> Value {
        match reducer {
            ReducerFn::Pure(reducer) => reducer(state, &action.payload, &action.meta),
            ReducerFn::Draft(_) => state.clone(),
        }
    }
}

/// Using the [reduce()](Reducer::reduce()) method, implementors of
/// this trait take an `Action` submitted to a store via
/// [StoreRef::dispatch()](crate::StoreRef::dispatch()) and produce
/// the next root state, along with the namespaces whose state
/// changed.
pub trait Reducer {
    /// Take an `Action` and the `prev_state` of the store, producing
    /// a new state. The previous state is never mutated.
    ///
    /// If no `events` are returned then it is assumed that the state
    /// has not changed, and store listeners do not need to be
    /// notified.
    fn reduce(&self, prev_state: &Value, action: &Action) -> ReducerResult;
}

/// The result of a [Reducer::reduce()] function.
pub struct ReducerResult {
    pub state: Value,
    /// The namespaces whose slice of the state changed identity.
    pub events: Vec<String>,
}

/// The reducers of a single model.
pub struct ModelReducer {
    namespace: String,
    reducers: HashMap<String, ReducerFn>,
    base_reducer: Option<Rc<BaseReducerFn>>,
}

impl ModelReducer {
    pub fn new(namespace: &str, model: &Model) -> Self {
        Self {
            namespace: namespace.to_string(),
            reducers: model
                .reducers()
                .iter()
                .map(|(name, reducer)| (name.clone(), reducer.clone()))
                .collect(),
            base_reducer: model.base_reducer_fn().cloned(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The state to seed this model with when no explicit state was
    /// declared.
    pub fn initial_state(&self) -> Value {
        match &self.base_reducer {
            Some(base) => base(&Value::Null, &Action::new(INIT)),
            None => Value::Null,
        }
    }

    fn reduce(&self, state: &Value, action: &Action, strategy: &dyn ReduceStrategy) -> Value {
        let state = match &self.base_reducer {
            Some(base) => base(state, action),
            None => state.clone(),
        };

        if action.namespace() != Some(self.namespace.as_str()) {
            return state;
        }

        match action.name().and_then(|name| self.reducers.get(name)) {
            Some(reducer) => strategy.apply(&self.namespace, reducer, &state, action),
            None => state,
        }
    }
}

/// A [Reducer] combining the reducers of every model registered with
/// the store: `root' = { ...root, [namespace]: reduce(root[namespace], action) }`.
pub struct CombinedReducer {
    models: Vec<ModelReducer>,
    strategy: Rc<dyn ReduceStrategy>,
}

impl CombinedReducer {
    pub fn new(strategy: Rc<dyn ReduceStrategy>) -> Self {
        CombinedReducer {
            models: Vec::new(),
            strategy,
        }
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.models.iter().any(|model| model.namespace == namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(ModelReducer::namespace)
    }

    pub fn push(&mut self, reducer: ModelReducer) {
        self.models.push(reducer);
    }
}

impl Reducer for CombinedReducer {
    fn reduce(&self, prev_state: &Value, action: &Action) -> ReducerResult {
        if action.action_type == REPLACE {
            return ReducerResult {
                state: prev_state.clone(),
                events: self.namespaces().map(String::from).collect(),
            };
        }

        let mut state = prev_state.clone();
        let mut events = Vec::new();

        for model in &self.models {
            let prev_slice = prev_state.get(&model.namespace).cloned().unwrap_or_default();
            let slice = model.reduce(&prev_slice, action, self.strategy.as_ref());
            if !slice.same(&prev_slice) {
                state.insert(model.namespace.clone(), slice);
                events.push(model.namespace.clone());
            }
        }

        ReducerResult { state, events }
    }
}
