use std::sync::Arc;
use tracing::debug;

use crate::bean::{AnyArc, DestroyFn};

/// A destroy hook, called with the bean on shutdown.
pub trait Finalizer<Dep>: 'static {
    fn finalize(&self, dependency: Arc<Dep>);
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: Fn(Arc<Dep>) + 'static,
{
    #[inline]
    fn finalize(&self, dependency: Arc<Dep>) {
        self(dependency);
    }
}

/// A destroy hook recorded for a wired bean. Finalizers run in reverse order of recording.
pub(crate) struct Destroyer {
    bean: String,
    hook: DestroyFn,
    instance: AnyArc,
}

impl Destroyer {
    #[inline]
    #[must_use]
    pub(crate) fn new(bean: String, hook: DestroyFn, instance: AnyArc) -> Self {
        Self { bean, hook, instance }
    }

    pub(crate) fn call(self) {
        (self.hook)(self.instance);
        debug!(bean = %self.bean, "Finalizer called");
    }
}

/// Runs every destroyer, last recorded first.
pub(crate) fn run_destroyers(mut destroyers: Vec<Destroyer>) {
    while let Some(destroyer) = destroyers.pop() {
        destroyer.call();
    }
}
