use std::fmt;
use tracing::error;

use super::{Condition, ConditionContext};
use crate::errors::ConditionErrorKind;

/// Negates a condition.
pub struct Not {
    condition: Box<dyn Condition>,
}

impl Not {
    #[inline]
    #[must_use]
    pub fn new(condition: impl Condition + 'static) -> Self {
        Self {
            condition: Box::new(condition),
        }
    }
}

impl Condition for Not {
    #[inline]
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        self.condition.matches(ctx).map(|matched| !matched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    /// Every condition matches
    And,
    /// At least one condition matches
    Or,
    /// No condition matches
    None,
}

/// Evaluates a flat list of conditions with one operator, short-circuiting.
pub struct Group {
    op: GroupOp,
    conditions: Vec<Box<dyn Condition>>,
}

impl Group {
    #[inline]
    #[must_use]
    pub fn new(op: GroupOp) -> Self {
        Self {
            op,
            conditions: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }
}

impl Condition for Group {
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        if self.conditions.is_empty() {
            let err = ConditionErrorKind::EmptyGroup;
            error!("{}", err);
            return Err(err);
        }
        for condition in &self.conditions {
            let matched = condition.matches(ctx)?;
            match (self.op, matched) {
                (GroupOp::And, false) => return Ok(false),
                (GroupOp::Or, true) => return Ok(true),
                (GroupOp::None, true) => return Ok(false),
                _ => {}
            }
        }
        Ok(self.op != GroupOp::Or)
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("op", &self.op)
            .field("len", &self.conditions.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOp {
    And,
    Or,
}

/// A chain of conditions evaluated strictly left to right, without precedence:
/// `a.or().on(b).and().on(c)` is `(a || b) && c`.
///
/// ```ignore
/// let condition = Conditional::new()
///     .on(OnProperty::new("cache.enabled"))
///     .and()
///     .on(OnMissingBean::of::<dyn Cache>());
/// ```
#[derive(Default)]
pub struct Conditional {
    head: Option<Box<dyn Condition>>,
    rest: Vec<(ChainOp, Option<Box<dyn Condition>>)>,
}

impl Conditional {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the pending position of the chain: its head, or the right side of the last operator.
    #[must_use]
    pub fn on(mut self, condition: impl Condition + 'static) -> Self {
        let condition: Box<dyn Condition> = Box::new(condition);
        match self.rest.last_mut() {
            Some((_, slot @ None)) => *slot = Some(condition),
            Some((op, Some(_))) => {
                let op = *op;
                self.rest.push((op, Some(condition)));
            }
            None if self.head.is_none() => self.head = Some(condition),
            None => self.rest.push((ChainOp::And, Some(condition))),
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn and(mut self) -> Self {
        self.rest.push((ChainOp::And, None));
        self
    }

    #[inline]
    #[must_use]
    pub fn or(mut self) -> Self {
        self.rest.push((ChainOp::Or, None));
        self
    }
}

impl Condition for Conditional {
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        let Some(head) = &self.head else {
            if self.rest.is_empty() {
                return Ok(true);
            }
            let err = ConditionErrorKind::IncompleteChain;
            error!("{}", err);
            return Err(err);
        };
        if self.rest.iter().any(|(_, condition)| condition.is_none()) {
            let err = ConditionErrorKind::IncompleteChain;
            error!("{}", err);
            return Err(err);
        }

        let mut matched = head.matches(ctx)?;
        for (op, condition) in &self.rest {
            let Some(condition) = condition else {
                continue;
            };
            match (op, matched) {
                (ChainOp::And, false) | (ChainOp::Or, true) => {}
                _ => matched = condition.matches(ctx)?,
            }
        }
        Ok(matched)
    }
}

impl fmt::Debug for Conditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditional")
            .field("len", &(usize::from(self.head.is_some()) + self.rest.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Conditional, Group, GroupOp, Not};
    use crate::{
        condition::{tests::props, Condition, ConditionContext, OnMatches, OnProperty},
        errors::ConditionErrorKind,
        registry::Registry,
    };

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tracing_test::traced_test;

    fn counting(result: bool, calls: &Arc<AtomicUsize>) -> impl Condition + 'static {
        let calls = calls.clone();
        OnMatches::new(move |_: &ConditionContext<'_>| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        })
    }

    #[test]
    fn test_not() {
        let props = props(&[("a", "1")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(!Not::new(OnProperty::new("a")).matches(&ctx).unwrap());
        assert!(Not::new(OnProperty::new("b")).matches(&ctx).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_group() {
        let props = props(&[("a", "1"), ("b", "2")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        let group = |op| Group::new(op).with(OnProperty::new("a")).with(OnProperty::new("c"));
        assert!(!group(GroupOp::And).matches(&ctx).unwrap());
        assert!(group(GroupOp::Or).matches(&ctx).unwrap());
        assert!(!group(GroupOp::None).matches(&ctx).unwrap());
        assert!(Group::new(GroupOp::None).with(OnProperty::new("c")).matches(&ctx).unwrap());
        assert!(Group::new(GroupOp::And)
            .with(OnProperty::new("a"))
            .with(OnProperty::new("b"))
            .matches(&ctx)
            .unwrap());
        assert!(matches!(Group::new(GroupOp::Or).matches(&ctx), Err(ConditionErrorKind::EmptyGroup)));
    }

    #[test]
    #[traced_test]
    fn test_chain_short_circuit() {
        let props = props(&[]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);
        let calls = Arc::new(AtomicUsize::new(0));

        let chain = Conditional::new().on(counting(false, &calls)).and().on(counting(true, &calls));
        assert!(!chain.matches(&ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let chain = Conditional::new().on(counting(true, &calls)).or().on(counting(false, &calls));
        assert!(chain.matches(&ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // (false || true) && true, left to right
        let chain = Conditional::new()
            .on(counting(false, &calls))
            .or()
            .on(counting(true, &calls))
            .and()
            .on(counting(true, &calls));
        assert!(chain.matches(&ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        assert!(Conditional::new().matches(&ctx).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_incomplete_chain() {
        let props = props(&[]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        let chain = Conditional::new().on(OnProperty::new("a")).and();
        assert!(matches!(chain.matches(&ctx), Err(ConditionErrorKind::IncompleteChain)));
        assert!(matches!(Conditional::new().or().matches(&ctx), Err(ConditionErrorKind::IncompleteChain)));
    }
}
