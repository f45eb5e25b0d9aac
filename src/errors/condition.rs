use super::{ExprErrorKind, PropertyErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ConditionErrorKind {
    #[error("Condition group has no conditions")]
    EmptyGroup,
    #[error("Condition chain ends with an operator without a condition")]
    IncompleteChain,
    #[error("Condition `{expr}` can't be evaluated: {source}")]
    Expr {
        expr: String,
        #[source]
        source: ExprErrorKind,
    },
    #[error("Condition of candidate bean `{bean}` failed: {source}")]
    Candidate {
        bean: String,
        #[source]
        source: Box<ConditionErrorKind>,
    },
    #[error(transparent)]
    Property(#[from] PropertyErrorKind),
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}
