//! [Middleware] used to modify the behaviour of a [Store](crate::Store)
//! during a [StoreRef::dispatch()]. Middleware is composed into a
//! [Chain] once, when the store is created, in the order of the
//! plugins which contribute it.

#[cfg(feature = "logger")]
pub mod logger;

use crate::{dispatcher::DispatchFuture, Action, StoreRef, Value};
use futures::future;
use std::rc::Rc;

/// Invoked once every middleware in a [Chain] has delegated to its
/// [Next].
pub type Terminal = Rc<dyn Fn(&StoreRef, Action) -> DispatchFuture>;

/// `Middleware` used to modify the behaviour of a
/// [Store](crate::Store) during a [StoreRef::dispatch()].
pub trait Middleware {
    /// This method is invoked for every `Action` dispatched to the
    /// store. Calling `next` runs the subsequent middleware, and
    /// eventually the reducer; code placed before and after awaiting
    /// it instruments the dispatch. A middleware may also choose not
    /// to call `next` at all, or to call it with a different action.
    ///
    /// `next` is expected to be run at most once; running it again
    /// re-invokes the remainder of the chain.
    fn on_dispatch(&self, store: &StoreRef, action: Action, next: Next) -> DispatchFuture;
}

/// Executes subsequent middleware and then the [Terminal] of the
/// [Chain].
#[derive(Clone)]
pub struct Next {
    store: StoreRef,
    chain: Chain,
    index: usize,
}

impl Next {
    pub fn run(&self, action: Action) -> DispatchFuture {
        match self.chain.middleware.get(self.index) {
            Some(middleware) => {
                let next = Next {
                    store: self.store.clone(),
                    chain: self.chain.clone(),
                    index: self.index + 1,
                };
                middleware.on_dispatch(&self.store, action, next)
            }
            None => (self.chain.terminal)(&self.store, action),
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }
}

/// An ordered list of [Middleware] composed around a [Terminal].
#[derive(Clone)]
pub struct Chain {
    middleware: Rc<[Rc<dyn Middleware>]>,
    terminal: Terminal,
}

impl Chain {
    /// A terminal which does nothing and resolves to [Value::Null].
    pub fn noop_terminal() -> Terminal {
        Rc::new(|_: &StoreRef, _: Action| -> DispatchFuture {
            Box::pin(future::ready(Ok(Value::Null)))
        })
    }

    /// Run `action` through the chain, starting from the first
    /// middleware.
    pub fn run(&self, store: &StoreRef, action: Action) -> DispatchFuture {
        Next {
            store: store.clone(),
            chain: self.clone(),
            index: 0,
        }
        .run(action)
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

/// Compose `middleware` into a single [Chain]. Each middleware's
/// [Next] invokes the middleware following it, and the last one's
/// invokes `terminal`.
pub fn compose(middleware: Vec<Rc<dyn Middleware>>, terminal: Terminal) -> Chain {
    Chain {
        middleware: middleware.into(),
        terminal,
    }
}
