use crate::{action::action_type, Action, Error, Result, Store, StoreRef, Value};
use futures::future::{self, LocalBoxFuture};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt::Debug,
    rc::{Rc, Weak},
};

/// The future produced by dispatching an `Action`.
pub type DispatchFuture = LocalBoxFuture<'static, Result<Value>>;

type DispatchFn = Rc<dyn Fn(Value, Value) -> DispatchFuture>;

/// Whether a [Dispatcher] was generated for a reducer or an effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherKind {
    Reducer,
    Effect,
}

/// A generated callable which dispatches the action of one reducer or
/// effect of a model, found at `dispatch[namespace][name]`.
#[derive(Clone)]
pub struct Dispatcher {
    action_type: Rc<str>,
    kind: DispatcherKind,
    call: DispatchFn,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispatcher({:?}, {})", self.kind, self.action_type)
    }
}

impl Dispatcher {
    pub fn new<F>(action_type: &str, kind: DispatcherKind, call: F) -> Self
    where
        F: Fn(Value, Value) -> DispatchFuture + 'static,
    {
        Self {
            action_type: action_type.into(),
            kind,
            call: Rc::new(call),
        }
    }

    /// A dispatcher which submits `namespace/name` actions to the
    /// store bound to `slot`.
    pub fn for_action(slot: &StoreSlot, namespace: &str, name: &str, kind: DispatcherKind) -> Self {
        let slot = slot.clone();
        let action_type = action_type(namespace, name);
        let dispatched_type = action_type.clone();
        Self::new(&action_type, kind, move |payload, meta| {
            slot.dispatch(Action::new(dispatched_type.clone()).payload(payload).meta(meta))
        })
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn kind(&self) -> DispatcherKind {
        self.kind
    }

    pub fn is_effect(&self) -> bool {
        self.kind == DispatcherKind::Effect
    }

    pub fn call<P: Into<Value>>(&self, payload: P) -> DispatchFuture {
        (self.call)(payload.into(), Value::Null)
    }

    pub fn call_with_meta<P: Into<Value>, M: Into<Value>>(&self, payload: P, meta: M) -> DispatchFuture {
        (self.call)(payload.into(), meta.into())
    }

    /// Produce a dispatcher of the same kind and action type whose
    /// calls are handled by `wrapper`, which receives this dispatcher
    /// to delegate to.
    pub fn wrap<F>(&self, wrapper: F) -> Dispatcher
    where
        F: Fn(&Dispatcher, Value, Value) -> DispatchFuture + 'static,
    {
        let inner = self.clone();
        Dispatcher {
            action_type: self.action_type.clone(),
            kind: self.kind,
            call: Rc::new(move |payload, meta| wrapper(&inner, payload, meta)),
        }
    }
}

/// The dispatchers of every registered model, keyed by namespace and
/// then by reducer/effect name. Clones share the same table.
#[derive(Clone, Default)]
pub struct DispatchTable(Rc<RefCell<BTreeMap<String, BTreeMap<String, Dispatcher>>>>);

impl DispatchTable {
    pub fn get(&self, namespace: &str, name: &str) -> Option<Dispatcher> {
        self.0
            .borrow()
            .get(namespace)
            .and_then(|dispatchers| dispatchers.get(name))
            .cloned()
    }

    /// All the dispatchers of the model registered under `namespace`.
    pub fn namespace(&self, namespace: &str) -> BTreeMap<String, Dispatcher> {
        self.0.borrow().get(namespace).cloned().unwrap_or_default()
    }

    /// Call the dispatcher for `namespace/name`.
    pub fn call<P: Into<Value>>(&self, namespace: &str, name: &str, payload: P) -> DispatchFuture {
        self.call_with_meta(namespace, name, payload, Value::Null)
    }

    pub fn call_with_meta<P: Into<Value>, M: Into<Value>>(
        &self,
        namespace: &str,
        name: &str,
        payload: P,
        meta: M,
    ) -> DispatchFuture {
        match self.get(namespace, name) {
            Some(dispatcher) => dispatcher.call_with_meta(payload, meta),
            None => Box::pin(future::ready(Err(Error::UnknownAction(action_type(
                namespace, name,
            ))))),
        }
    }

    pub fn insert(&self, namespace: &str, name: &str, dispatcher: Dispatcher) {
        self.0
            .borrow_mut()
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), dispatcher);
    }

    /// Replace the dispatcher for `namespace/name` with the result of
    /// `update`. Returns `false` if there is no such dispatcher.
    pub fn update<F: FnOnce(&Dispatcher) -> Dispatcher>(&self, namespace: &str, name: &str, update: F) -> bool {
        let mut table = self.0.borrow_mut();
        match table.get_mut(namespace).and_then(|dispatchers| dispatchers.get_mut(name)) {
            Some(dispatcher) => {
                *dispatcher = update(dispatcher);
                true
            }
            None => false,
        }
    }

    /// The names of the effect dispatchers of the model registered
    /// under `namespace`.
    pub fn effect_names(&self, namespace: &str) -> Vec<String> {
        self.0
            .borrow()
            .get(namespace)
            .map(|dispatchers| {
                dispatchers
                    .iter()
                    .filter(|(_, dispatcher)| dispatcher.is_effect())
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A late bound, weak reference to the [Store] under construction.
///
/// Dispatchers are generated while models are registered, before the
/// store exists; they reach it through this slot once
/// [create_store()](crate::create_store()) has bound it.
#[derive(Clone)]
pub struct StoreSlot(Rc<RefCell<Weak<Store>>>);

impl Default for StoreSlot {
    fn default() -> Self {
        StoreSlot(Rc::new(RefCell::new(Weak::new())))
    }
}

impl StoreSlot {
    pub(crate) fn bind(&self, store: &StoreRef) {
        *self.0.borrow_mut() = store.downgrade();
    }

    pub fn upgrade(&self) -> Option<StoreRef> {
        self.0.borrow().upgrade().map(StoreRef::from)
    }

    /// Dispatch `action` to the bound store.
    pub fn dispatch(&self, action: Action) -> DispatchFuture {
        match self.upgrade() {
            Some(store) => store.dispatch(action),
            None => Box::pin(future::ready(Err(Error::StoreDropped))),
        }
    }
}
