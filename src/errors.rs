mod bind;
mod condition;
mod container;
mod instantiate;
mod property;
mod resolve;

pub use bind::BindErrorKind;
pub use condition::ConditionErrorKind;
pub use container::ContainerErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use property::PropertyErrorKind;
pub use resolve::ResolveErrorKind;

pub use crate::expr::ExprErrorKind;

/// Any error the container can surface to the caller of [`crate::Container::refresh`]
/// or [`crate::Application::start`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Property(#[from] PropertyErrorKind),
    #[error(transparent)]
    Bind(#[from] BindErrorKind),
    #[error(transparent)]
    Condition(#[from] ConditionErrorKind),
    #[error(transparent)]
    Resolve(#[from] ResolveErrorKind),
    #[error(transparent)]
    Container(#[from] ContainerErrorKind),
    #[error("Application callback of bean `{bean}` failed: {source}")]
    Callback {
        bean: String,
        #[source]
        source: anyhow::Error,
    },
}
