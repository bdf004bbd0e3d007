//! Logging [Middleware] which reports every action dispatched to a
//! [Store](crate::Store), along with the state of the namespace it is
//! addressed to before and after it has been reduced.

use crate::{
    dispatcher::DispatchFuture,
    middleware::{Middleware, Next},
    plugin::Plugin,
    Action, StoreRef,
};
use std::rc::Rc;

#[derive(Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Warn,
    Info,
}

impl LogLevel {
    pub fn log<S: AsRef<str>>(&self, message: S) {
        match self {
            LogLevel::Trace => log::trace!("{}", message.as_ref()),
            LogLevel::Debug => log::debug!("{}", message.as_ref()),
            LogLevel::Warn => log::warn!("{}", message.as_ref()),
            LogLevel::Info => log::info!("{}", message.as_ref()),
        }
    }

    fn level(&self) -> log::Level {
        match self {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

#[derive(Default)]
pub struct LoggerMiddleware {
    log_level: LogLevel,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Middleware for LoggerMiddleware {
    fn on_dispatch(&self, store: &StoreRef, action: Action, next: Next) -> DispatchFuture {
        let log_level = self.log_level;
        if !log::log_enabled!(log_level.level()) {
            return next.run(action);
        }

        let namespace = action.namespace().map(String::from);
        let slice = move |store: &StoreRef| match &namespace {
            Some(namespace) => format!("{:?}", store.get_state(namespace)),
            None => format!("{:?}", store.state()),
        };

        log_level.log(format!("prev state: {}", slice(store)));
        log_level.log(format!("action: {:?}", action));

        let store = store.clone();
        Box::pin(async move {
            let result = next.run(action).await;
            match &result {
                Ok(_) => log_level.log(format!("next state: {}", slice(&store))),
                Err(error) => log_level.log(format!("dispatch failed: {}", error)),
            }
            result
        })
    }
}

/// Contributes a [LoggerMiddleware] to the store's middleware chain.
#[derive(Default)]
pub struct LoggerPlugin {
    log_level: LogLevel,
}

impl LoggerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        "logger"
    }

    fn middleware(&self) -> Option<Rc<dyn Middleware>> {
        Some(Rc::new(LoggerMiddleware::new().log_level(self.log_level)))
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, LoggerPlugin};
    use crate::{create_store, Model, StoreConfig, Value};
    use futures::executor::block_on;

    #[test]
    fn logger_passes_actions_through() {
        let store = create_store(
            vec![("counter", Model::with_state(0).reducer("add", |state, payload, _| {
                Value::from(state.as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(0))
            }))],
            StoreConfig::new().plugin(LoggerPlugin::new().log_level(LogLevel::Trace)),
        )
        .unwrap();

        let result = block_on(store.dispatcher("counter", "add").unwrap().call(4)).unwrap();
        assert_eq!(Value::from(4), result);
        assert_eq!(Some(Value::from(4)), store.get_state("counter"));
    }
}
