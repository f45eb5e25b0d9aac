use crate::container::LifecycleState;

#[derive(thiserror::Error, Debug)]
pub enum ContainerErrorKind {
    #[error("Container is frozen, `{operation}` is allowed only before resolving starts")]
    Frozen { operation: &'static str },
    #[error("Container can't `{operation}` in state {state:?}")]
    InvalidState { operation: &'static str, state: LifecycleState },
    #[error("Container has no boot configuration to reload")]
    NoBootConfig,
    #[error("Bean with name `{name}` and type {ty} is already registered")]
    Duplicate { name: String, ty: &'static str },
    #[error("Bean selector `{selector}` is invalid: {reason}")]
    InvalidSelector { selector: String, reason: String },
}
