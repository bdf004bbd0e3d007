//! Configuration shared by the [LoadingPlugin](super::loading::LoadingPlugin)
//! and [ErrorPlugin](super::error::ErrorPlugin): which namespace their
//! bookkeeping model is registered under, how counters are exposed in
//! the state, and which effects are tracked.

use crate::{action::SEPARATOR, dispatcher::StoreSlot, Action, Error, Result, Value};
use serde::Deserialize;
use std::collections::HashSet;

/// Options of a bookkeeping plugin.
///
/// Can be deserialized (camelCase keys):
///
/// ```
/// # use reactive_models::plugin::scope::ScopeConfig;
/// let config = ScopeConfig::from_json(
///     "loading",
///     serde_json::json!({"asNumber": true, "whitelist": ["counter/load"]}),
/// ).unwrap();
/// assert!(config.as_number);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ScopeConfig {
    /// The namespace of the bookkeeping model.
    pub name: Option<String>,
    /// Expose counters as numbers rather than booleans.
    pub as_number: bool,
    /// Only track these effects (`"<namespace>/<effect>"`).
    pub whitelist: Option<Vec<String>>,
    /// Track every effect except these.
    pub blacklist: Option<Vec<String>>,
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the options of `plugin` from JSON.
    pub fn from_json(plugin: &str, value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|error| Error::invalid_config(plugin, error.to_string()))
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn as_number(mut self, as_number: bool) -> Self {
        self.as_number = as_number;
        self
    }

    pub fn whitelist<I: IntoIterator<Item = S>, S: Into<String>>(mut self, effects: I) -> Self {
        self.whitelist = Some(effects.into_iter().map(Into::into).collect());
        self
    }

    pub fn blacklist<I: IntoIterator<Item = S>, S: Into<String>>(mut self, effects: I) -> Self {
        self.blacklist = Some(effects.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn namespace_or(&self, default: &str) -> String {
        self.name.clone().unwrap_or_else(|| default.to_string())
    }

    pub(crate) fn validate(self, plugin: &str, default_namespace: &str) -> Result<Scope> {
        let namespace = self.namespace_or(default_namespace);
        if namespace.is_empty() || namespace.contains(SEPARATOR) {
            return Err(Error::invalid_config(
                plugin,
                format!("`name` must be non-empty and must not contain `{}`", SEPARATOR),
            ));
        }

        let filter = match (self.whitelist, self.blacklist) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(
                    plugin,
                    "`whitelist` and `blacklist` cannot both be supplied",
                ))
            }
            (Some(whitelist), None) => Filter::Only(effect_set(plugin, "whitelist", whitelist)?),
            (None, Some(blacklist)) => Filter::Except(effect_set(plugin, "blacklist", blacklist)?),
            (None, None) => Filter::All,
        };

        Ok(Scope {
            namespace,
            as_number: self.as_number,
            filter,
        })
    }
}

fn effect_set(plugin: &str, option: &str, effects: Vec<String>) -> Result<HashSet<String>> {
    match effects.iter().find(|effect| !effect.contains(SEPARATOR)) {
        Some(effect) => Err(Error::invalid_config(
            plugin,
            format!(
                "`{}` entry `{}` must be a qualified effect name `<namespace>{}<effect>`",
                option, effect, SEPARATOR
            ),
        )),
        None => Ok(effects.into_iter().collect()),
    }
}

#[derive(Debug)]
enum Filter {
    All,
    Only(HashSet<String>),
    Except(HashSet<String>),
}

/// Validated [ScopeConfig].
#[derive(Debug)]
pub struct Scope {
    namespace: String,
    as_number: bool,
    filter: Filter,
}

impl Scope {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the effect with the qualified `action_type` is tracked.
    pub fn includes(&self, action_type: &str) -> bool {
        match &self.filter {
            Filter::All => true,
            Filter::Only(effects) => effects.contains(action_type),
            Filter::Except(effects) => !effects.contains(action_type),
        }
    }

    /// How a counter appears in the state.
    pub fn expose(&self, count: i64) -> Value {
        if self.as_number {
            Value::Int(count)
        } else {
            Value::Bool(count > 0)
        }
    }
}

/// A bookkeeping update for one effect: the values to store for the
/// whole store, the model and the effect itself.
pub(crate) struct Entry {
    pub global: Value,
    pub model: Value,
    pub effect: Value,
}

impl Entry {
    pub(crate) fn into_payload(self, namespace: &str, name: &str) -> Value {
        Value::object()
            .with("namespace", namespace)
            .with("action", name)
            .with("global", self.global)
            .with("model", self.model)
            .with("effect", self.effect)
    }
}

/// The reducer of a bookkeeping model, writing an [Entry] payload into
/// `{ global, models: {namespace}, effects: {namespace: {action}} }`.
pub(crate) fn write_entry(state: &Value, payload: &Value, _meta: &Value) -> Value {
    let (namespace, name) = match (
        payload.get("namespace").and_then(Value::as_str),
        payload.get("action").and_then(Value::as_str),
    ) {
        (Some(namespace), Some(name)) => (namespace, name),
        _ => {
            log::warn!("ignoring malformed bookkeeping payload {}", payload);
            return state.clone();
        }
    };
    let field = |key: &str| payload.get(key).cloned().unwrap_or_default();

    let mut state = state.clone();
    state.insert("global", field("global"));
    state.entry("models").insert(namespace, field("model"));
    state.entry("effects").entry(namespace).insert(name, field("effect"));
    state
}

/// Dispatch `reducer` of the bookkeeping model. The counters behind
/// `payload` are already settled, so a failure is only reported.
pub(crate) async fn update(slot: &StoreSlot, scope: &Scope, reducer: &str, payload: Value) {
    let action = Action::for_model(scope.namespace(), reducer).payload(payload);
    if let Err(error) = slot.dispatch(action).await {
        log::warn!("could not update `{}`: {}", scope.namespace(), error);
    }
}

/// The initial state of a bookkeeping model tracking `models`, each
/// with their effect names, where every entry is set to `initial`.
pub(crate) fn seed_state(models: &[(String, Vec<String>)], initial: &Value) -> Value {
    let mut state = Value::object()
        .with("global", initial.clone())
        .with("models", Value::object())
        .with("effects", Value::object());
    for (namespace, effects) in models {
        state.entry("models").insert(namespace.as_str(), initial.clone());
        let model_effects = state.entry("effects").entry(namespace.as_str());
        *model_effects = Value::object();
        for effect in effects {
            model_effects.insert(effect.as_str(), initial.clone());
        }
    }
    state
}
