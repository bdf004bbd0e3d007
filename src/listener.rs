use crate::Value;
use std::rc::{Rc, Weak};

/// A trait to take a [Callback] or other custom callback type and
/// produce a [Listener] for it.
pub trait AsListener {
    fn as_listener(&self) -> Listener;
}

/// A reference to a callback function (usually [Callback]) which is
/// notified of changes to the state of a namespace in a
/// [Store](crate::Store).
///
/// A weak listener is removed from the store once the callback it
/// refers to has been dropped.
#[derive(Clone)]
pub enum Listener {
    Strong(Rc<dyn Fn(&Value)>),
    Weak(Weak<dyn Fn(&Value)>),
}

impl Listener {
    /// Attempt to upgrade the reference in this listener to a
    /// [Callback], otherwise if unable to, returns `None`.
    pub fn as_callback(&self) -> Option<Callback> {
        match self {
            Listener::Strong(callback) => Some(Callback(callback.clone())),
            Listener::Weak(callback) => callback.upgrade().map(Callback),
        }
    }
}

impl AsListener for Listener {
    fn as_listener(&self) -> Listener {
        self.clone()
    }
}

/// A wrapper for a callback which is notified of changes to the
/// state of a namespace in a [Store](crate::Store).
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Value)>);

/// Subscribing with a borrowed callback produces a weak listener.
impl AsListener for &Callback {
    fn as_listener(&self) -> Listener {
        Listener::Weak(Rc::downgrade(&self.0))
    }
}

/// Subscribing with an owned callback keeps it alive until it is
/// unsubscribed.
impl AsListener for Callback {
    fn as_listener(&self) -> Listener {
        Listener::Strong(self.0.clone())
    }
}

impl Callback {
    pub fn new<C: Fn(&Value) + 'static>(closure: C) -> Self {
        Callback(Rc::new(closure))
    }

    pub fn emit(&self, state: &Value) {
        (self.0)(state)
    }
}

impl<C> From<C> for Callback
where
    C: Fn(&Value) + 'static,
{
    fn from(closure: C) -> Self {
        Callback(Rc::new(closure))
    }
}
