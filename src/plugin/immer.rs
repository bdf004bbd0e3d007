//! Draft reducers. A draft reducer mutates a scratch copy of its
//! state in place; the store then commits a new state which shares
//! every subtree the reducer left alone with the previous state, so
//! that [Value::same()] holds for them.

use super::{Plugin, PluginContext};
use crate::{
    reducer::{ReduceStrategy, ReducerFn},
    Action, Map, Result, Value,
};
use serde::Deserialize;
use std::{collections::HashSet, rc::Rc};

/// Options of the [ImmerPlugin].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImmerConfig {
    /// Namespaces whose reducers must be pure. Defaults to the
    /// bookkeeping models of the enabled loading and error plugins.
    pub blacklist: Option<Vec<String>>,
}

impl ImmerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blacklist<I: IntoIterator<Item = S>, S: Into<String>>(mut self, namespaces: I) -> Self {
        self.blacklist = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn into_blacklist(self) -> Option<Vec<String>> {
        self.blacklist
    }
}

/// Installs the [DraftStrategy].
pub struct ImmerPlugin {
    strategy: Rc<DraftStrategy>,
}

impl ImmerPlugin {
    pub fn new<I: IntoIterator<Item = String>>(blacklist: I) -> Self {
        Self {
            strategy: Rc::new(DraftStrategy {
                blacklist: blacklist.into_iter().collect(),
            }),
        }
    }
}

impl Plugin for ImmerPlugin {
    fn name(&self) -> &str {
        "immer"
    }

    fn on_init(&mut self, context: &mut PluginContext) -> Result<()> {
        context.set_reduce_strategy(self.strategy.clone());
        Ok(())
    }
}

/// Applies draft reducers to a copy of the state, outside of the
/// blacklisted namespaces.
pub struct DraftStrategy {
    blacklist: HashSet<String>,
}

impl ReduceStrategy for DraftStrategy {
    fn supports_drafts(&self, namespace: &str) -> bool {
        !self.blacklist.contains(namespace)
    }

    fn apply(&self, _namespace: &str, reducer: &ReducerFn, state: &Value, action: &Action) -> Value {
        match reducer {
            ReducerFn::Pure(reducer) => reducer(state, &action.payload, &action.meta),
            ReducerFn::Draft(reducer) => {
                let mut draft = state.clone();
                let next = reducer(&mut draft, &action.payload, &action.meta).unwrap_or(draft);
                reconcile(state, next)
            }
        }
    }
}

/// Restore the identity of every subtree of `next` which is equal to
/// the corresponding subtree of `prev`. A draft which was written to
/// without changing anything therefore reconciles to `prev` itself.
pub fn reconcile(prev: &Value, next: Value) -> Value {
    if prev.same(&next) {
        return prev.clone();
    }
    match (prev, next) {
        (Value::Object(prev_map), Value::Object(next_map)) => {
            let next_map = Rc::try_unwrap(next_map).unwrap_or_else(|shared| (*shared).clone());
            let mut unchanged = prev_map.len() == next_map.len();
            let map: Map = next_map
                .into_iter()
                .map(|(key, value)| {
                    let value = match prev_map.get(&key) {
                        Some(prev_value) => {
                            let value = reconcile(prev_value, value);
                            unchanged &= prev_value.same(&value);
                            value
                        }
                        None => {
                            unchanged = false;
                            value
                        }
                    };
                    (key, value)
                })
                .collect();
            if unchanged {
                prev.clone()
            } else {
                Value::from(map)
            }
        }
        (Value::Array(prev_items), Value::Array(next_items)) => {
            let next_items = Rc::try_unwrap(next_items).unwrap_or_else(|shared| (*shared).clone());
            let mut unchanged = prev_items.len() == next_items.len();
            let items: Vec<Value> = next_items
                .into_iter()
                .enumerate()
                .map(|(index, value)| match prev_items.get(index) {
                    Some(prev_value) => {
                        let value = reconcile(prev_value, value);
                        unchanged &= prev_value.same(&value);
                        value
                    }
                    None => {
                        unchanged = false;
                        value
                    }
                })
                .collect();
            if unchanged {
                prev.clone()
            } else {
                Value::from(items)
            }
        }
        (_, next) => next,
    }
}
