extern crate self as sprig;

#[macro_use]
pub(crate) mod macros;

pub(crate) mod app;
pub(crate) mod bean;
pub(crate) mod configurer;
pub(crate) mod container;
pub(crate) mod dependency_resolver;
pub(crate) mod finalizer;
pub(crate) mod instantiator;
pub(crate) mod registry;
pub(crate) mod wiring;

pub mod bind;
pub mod boot;
pub mod condition;
pub mod dynamic;
pub mod errors;
pub mod expr;
pub mod properties;
pub mod sources;

pub use app::{AppContext, AppEvent, AppRunner, Application, Shutdown};
pub use bean::{AnyArc, Bean, BeanDefinition, BeanId, BeanSelector, BeanState, Component};
pub use boot::BootConfig;
pub use configurer::{Configure, Configurer, Declarations};
pub use container::{Container, LifecycleState};
pub use dependency_resolver::{DependencyResolver, Inject, InjectAll, Lazy, Value};
pub use dynamic::{Dynamic, RefreshReport};
pub use errors::Error;
pub use finalizer::Finalizer;
pub use instantiator::Instantiator;
pub use registry::Registry;
pub use wiring::Wiring;

pub use sprig_macros::{Bind, Component};
