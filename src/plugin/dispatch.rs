use super::{Plugin, PluginContext};
use crate::{
    dispatcher::{Dispatcher, DispatcherKind},
    model::validate_name,
    Model, Result,
};

/// Generates a [Dispatcher] for every reducer of every model, found at
/// `dispatch[namespace][reducer]`.
#[derive(Default)]
pub struct DispatchPlugin;

impl DispatchPlugin {
    pub fn new() -> Self {
        DispatchPlugin
    }
}

impl Plugin for DispatchPlugin {
    fn name(&self) -> &str {
        "dispatch"
    }

    fn on_model(&mut self, namespace: &str, model: &mut Model, context: &mut PluginContext) -> Result<()> {
        // Nothing is generated unless every name is usable.
        for name in model.reducers().keys() {
            validate_name(namespace, "reducer", name)?;
        }

        for name in model.reducers().keys() {
            context.dispatch().insert(
                namespace,
                name,
                Dispatcher::for_action(context.store(), namespace, name, DispatcherKind::Reducer),
            );
        }
        Ok(())
    }
}
