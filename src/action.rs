use crate::Value;
use serde::Serialize;

/// Separates the namespace from the reducer/effect name in an
/// action type: `"<namespace>/<name>"`.
pub const SEPARATOR: char = '/';

/// Root level pseudo-action which makes every subscriber of the
/// store reevaluate, dispatched after a model has been added to a
/// running store.
pub const REPLACE: &str = "@@reactive-models/REPLACE";

/// Produced while seeding the state of a model which only has a
/// base reducer.
pub const INIT: &str = "@@reactive-models/INIT";

/// Compose the action type of the reducer/effect `name` on the model
/// registered under `namespace`.
pub fn action_type(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, SEPARATOR, name)
}

/// An `Action` submitted to a [Store](crate::Store) via
/// [StoreRef::dispatch()](crate::StoreRef::dispatch()).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: Value,
    pub meta: Value,
}

impl Action {
    pub fn new<T: Into<String>>(action_type: T) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Value::Null,
            meta: Value::Null,
        }
    }

    /// An action addressed to the reducer/effect `name` of the model
    /// registered under `namespace`.
    pub fn for_model(namespace: &str, name: &str) -> Self {
        Self::new(action_type(namespace, name))
    }

    pub fn payload<P: Into<Value>>(mut self, payload: P) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn meta<M: Into<Value>>(mut self, meta: M) -> Self {
        self.meta = meta.into();
        self
    }

    /// The namespace part of the action type, `None` for actions
    /// which are not addressed to a model (such as [REPLACE]).
    pub fn namespace(&self) -> Option<&str> {
        self.split().map(|(namespace, _)| namespace)
    }

    /// The reducer/effect name part of the action type.
    pub fn name(&self) -> Option<&str> {
        self.split().map(|(_, name)| name)
    }

    fn split(&self) -> Option<(&str, &str)> {
        if self.action_type.starts_with("@@") {
            return None;
        }
        self.action_type.split_once(SEPARATOR)
    }
}
