use super::{BindErrorKind, ConditionErrorKind, ContainerErrorKind, InstantiateErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("No bean found for selector `{selector}`")]
    NotFound { selector: String },
    #[error("Found {} beans for selector `{selector}`: {}", candidates.len(), candidates.join(", "))]
    Ambiguous { selector: String, candidates: Vec<String> },
    #[error("Cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },
    #[error("Cyclic configurers order detected: {}", path.join(" -> "))]
    CyclicConfigurers { path: Vec<String> },
    #[error("Condition of bean `{bean}` failed: {source}")]
    Condition {
        bean: String,
        #[source]
        source: ConditionErrorKind,
    },
    #[error("Binding for bean `{bean}` failed: {source}")]
    Bind {
        bean: String,
        #[source]
        source: BindErrorKind,
    },
    #[error("Factory of bean `{bean}` returned error: {source}")]
    FactoryReturnedError {
        bean: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Initializer of bean `{bean}` returned error: {source}")]
    Init {
        bean: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Configurer `{name}` returned error: {source}")]
    Configurer {
        name: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error(transparent)]
    Container(#[from] ContainerErrorKind),
    #[error("Incorrect bean type. Actual: {actual}, expected: {expected}")]
    IncorrectType { expected: &'static str, actual: &'static str },
}
