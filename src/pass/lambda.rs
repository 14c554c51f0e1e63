use std::any::Any;

use super::{Pass, PassCore, RenderContext};
use crate::error::PassError;

type Callback = Box<dyn FnMut(&mut RenderContext<'_>) -> Result<(), PassError>>;

/// Runs a closure in the pass sequence.
///
/// Useful for host work that has to happen at a specific point of the frame, like
/// updating an effect uniform from scene state. The default chain passes through.
pub struct LambdaPass {
    core: PassCore,
    callback: Callback,
}

impl LambdaPass {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&mut RenderContext<'_>) -> Result<(), PassError> + 'static,
    {
        Self {
            core: PassCore::without_swap("LambdaPass"),
            callback: Box::new(callback),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.core.set_name(name);
        self
    }
}

impl Pass for LambdaPass {
    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        (self.callback)(ctx)
    }
}
