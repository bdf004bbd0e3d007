//! A registry of models (state, reducers and async effects) on top of
//! a redux-like [Store], extended through [plugins](plugin).

mod action;
pub mod declare;
pub mod dispatcher;
mod error;
mod listener;
pub mod middleware;
pub mod model;
pub mod plugin;
pub mod reducer;
mod store;
mod value;

pub use action::{action_type, Action, INIT, REPLACE, SEPARATOR};
pub use dispatcher::{DispatchFuture, DispatchTable, Dispatcher, DispatcherKind};
pub use error::{Error, Result};
pub use listener::*;
pub use model::{Effect, EffectFuture, Effects, Model};
pub use plugin::{
    effects::EffectContext,
    error::Errors,
    immer::ImmerConfig,
    loading::Loading,
    scope::ScopeConfig,
    Plugin, PluginContext,
};
pub use reducer::ReducerFn;
pub use store::{create_store, Store, StoreConfig, StoreRef, Subscription};
pub use value::{Map, Value};
