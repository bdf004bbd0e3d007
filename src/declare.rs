//! Models declared as data. The declaration names its reducers and
//! effects, and the names are resolved against a table of [Handlers]:
//!
//! ```
//! # use reactive_models::{declare::{load_models, Handlers}, Value};
//! let handlers = Handlers::new().reducer("increment", |state, payload, _| {
//!     Value::from(state.as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(1))
//! });
//! let models = load_models(
//!     r#"{ "count": { "state": 0, "reducers": { "increment": "increment" } } }"#,
//!     &handlers,
//! ).unwrap();
//! assert_eq!("count", models[0].0);
//! ```

use crate::{
    model::Effect,
    reducer::ReducerFn,
    EffectContext, Error, Model, Result, Value,
};
use serde::{Deserialize, Deserializer};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
};

/// The declaration of one model.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelDecl {
    /// `Some(Value::Null)` for an explicit `"state": null`.
    #[serde(deserialize_with = "present")]
    pub state: Option<Value>,
    pub reducers: BTreeMap<String, serde_json::Value>,
    pub effects: BTreeMap<String, serde_json::Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Named reducers and effects which declarations can refer to.
#[derive(Clone, Default)]
pub struct Handlers {
    reducers: HashMap<String, ReducerFn>,
    effects: HashMap<String, Effect>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reducer<N, F>(mut self, name: N, reducer: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Value, &Value, &Value) -> Value + 'static,
    {
        self.reducers.insert(name.into(), ReducerFn::pure(reducer));
        self
    }

    pub fn draft_reducer<N, F>(mut self, name: N, reducer: F) -> Self
    where
        N: Into<String>,
        F: Fn(&mut Value, &Value, &Value) -> Option<Value> + 'static,
    {
        self.reducers.insert(name.into(), ReducerFn::draft(reducer));
        self
    }

    pub fn effect<N, F, Fut>(self, name: N, body: F) -> Self
    where
        N: Into<String>,
        F: Fn(Value, EffectContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.effect_entry(name, Effect::new(body))
    }

    pub fn effect_entry<N: Into<String>>(mut self, name: N, effect: Effect) -> Self {
        self.effects.insert(name.into(), effect);
        self
    }
}

impl ModelDecl {
    /// Build the [Model] declared under `namespace`.
    pub fn resolve(&self, namespace: &str, handlers: &Handlers) -> Result<Model> {
        let mut model = Model::new();
        if let Some(state) = &self.state {
            model = model.state(state.clone());
        }

        for (name, handler) in &self.reducers {
            let reducer = lookup(namespace, "reducer", name, handler, &handlers.reducers)?;
            model = model.reducer_fn(name.as_str(), reducer.clone());
        }
        for (name, handler) in &self.effects {
            let effect = lookup(namespace, "effect", name, handler, &handlers.effects)?;
            model = model.effect_entry(name.as_str(), effect.clone());
        }
        Ok(model)
    }
}

fn lookup<'a, T>(
    namespace: &str,
    kind: &str,
    name: &str,
    handler: &serde_json::Value,
    table: &'a HashMap<String, T>,
) -> Result<&'a T> {
    handler
        .as_str()
        .and_then(|handler| table.get(handler))
        .ok_or_else(|| {
            Error::invalid_model(
                namespace,
                format!("{} `{}` is not callable (declared as {})", kind, name, handler),
            )
        })
}

/// Parse a JSON object of `namespace: declaration` entries and
/// resolve every declaration against `handlers`. The models are
/// returned in namespace order.
pub fn load_models(json: &str, handlers: &Handlers) -> Result<Vec<(String, Model)>> {
    let declarations: BTreeMap<String, ModelDecl> = serde_json::from_str(json)
        .map_err(|error| Error::invalid_model("", format!("malformed declaration: {}", error)))?;
    declarations
        .iter()
        .map(|(namespace, declaration)| Ok((namespace.clone(), declaration.resolve(namespace, handlers)?)))
        .collect()
}
