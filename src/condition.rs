mod builtin;
mod compose;

pub use builtin::{OnBean, OnExpression, OnMatches, OnMissingBean, OnMissingProperty, OnProfile, OnProperty, OnSingleBean};
pub use compose::{Conditional, Group, GroupOp, Not};

use std::{cell::RefCell, collections::HashMap};
use tracing::debug;

use crate::{
    bean::{BeanDefinition, BeanId, BeanSelector, BeanState},
    errors::{ConditionErrorKind, PropertyErrorKind},
    properties::PropertyReader,
    registry::Registry,
};

/// A predicate deciding whether a bean is wired.
pub trait Condition: Send + Sync {
    /// # Errors
    /// Returns [`ConditionErrorKind`] if the condition can't be evaluated.
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind>;
}

impl<C: Condition + ?Sized> Condition for Box<C> {
    #[inline]
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        (**self).matches(ctx)
    }
}

/// What conditions see: the property snapshot and the beans not rejected so far.
#[derive(Clone, Copy)]
pub struct ConditionContext<'a> {
    props: &'a dyn PropertyReader,
    registry: &'a Registry,
    verdicts: Option<&'a Verdicts>,
}

impl<'a> ConditionContext<'a> {
    #[inline]
    #[must_use]
    pub fn new(props: &'a dyn PropertyReader, registry: &'a Registry) -> Self {
        Self {
            props,
            registry,
            verdicts: None,
        }
    }

    /// Candidates still being filtered are decided on demand through `verdicts`.
    #[inline]
    #[must_use]
    pub(crate) fn with_verdicts(mut self, verdicts: &'a Verdicts) -> Self {
        self.verdicts = Some(verdicts);
        self
    }

    #[inline]
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.props.has(key)
    }

    /// The raw value at `key`, without interpolation.
    #[inline]
    #[must_use]
    pub fn prop(&self, key: &str) -> Option<&'a str> {
        self.props.get(key)
    }

    /// # Errors
    /// Returns [`PropertyErrorKind`] if a reference can't be resolved.
    #[inline]
    pub fn resolve(&self, input: &str) -> Result<String, PropertyErrorKind> {
        self.props.resolve(input)
    }

    /// Beans chosen by `selector` that survive their own conditions.
    ///
    /// While the container filters, a candidate whose conditions weren't evaluated yet is decided first,
    /// so `OnMissingBean` sees the final outcome. A candidate already being decided higher up counts as present.
    ///
    /// # Errors
    /// Returns [`ConditionErrorKind::Candidate`] if a candidate's conditions can't be evaluated.
    pub fn find(&self, selector: &BeanSelector) -> Result<Vec<&'a BeanDefinition>, ConditionErrorKind> {
        let mut found = Vec::new();
        for bean in self.registry.find(selector) {
            if self.accepts(bean)? {
                found.push(bean);
            }
        }
        Ok(found)
    }

    fn accepts(&self, bean: &BeanDefinition) -> Result<bool, ConditionErrorKind> {
        let Some(verdicts) = self.verdicts else {
            return Ok(true);
        };
        if bean.state() != BeanState::Resolving {
            return Ok(true);
        }
        match verdicts.decide(bean, self) {
            Ok(verdict) => Ok(verdict != Verdict::Rejected),
            Err(source) => Err(ConditionErrorKind::Candidate {
                bean: bean.name().to_owned(),
                source: Box::new(source),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Deciding,
    Accepted,
    Rejected,
}

/// Outcome of each bean's conditions during one filter run, decided at most once per bean.
#[derive(Default)]
pub(crate) struct Verdicts {
    decided: RefCell<HashMap<BeanId, Verdict>>,
}

impl Verdicts {
    #[inline]
    #[must_use]
    pub(crate) fn get(&self, id: BeanId) -> Option<Verdict> {
        self.decided.borrow().get(&id).copied()
    }

    /// Evaluates the conditions of `bean` unless it's already decided or being decided.
    pub(crate) fn decide(&self, bean: &BeanDefinition, ctx: &ConditionContext<'_>) -> Result<Verdict, ConditionErrorKind> {
        if let Some(verdict) = self.get(bean.id()) {
            return Ok(verdict);
        }
        self.decided.borrow_mut().insert(bean.id(), Verdict::Deciding);

        let verdict = match matches_all(&bean.conditions, ctx) {
            Ok(true) => Verdict::Accepted,
            Ok(false) => Verdict::Rejected,
            Err(err) => {
                self.decided.borrow_mut().remove(&bean.id());
                return Err(err);
            }
        };
        debug!(bean = bean.name(), ?verdict, "Conditions decided");
        self.decided.borrow_mut().insert(bean.id(), verdict);
        Ok(verdict)
    }
}

/// Evaluates every condition of a bean: all of them must match.
///
/// # Errors
/// Returns the first [`ConditionErrorKind`] raised.
pub(crate) fn matches_all(conditions: &[Box<dyn Condition>], ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
    for condition in conditions {
        if !condition.matches(ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{matches_all, Condition, ConditionContext, OnMissingProperty, OnProperty};
    use crate::{properties::Properties, registry::Registry};

    pub(crate) fn props(pairs: &[(&str, &str)]) -> Properties {
        Properties::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_matches_all() {
        let props = props(&[("a", "1")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        let conditions: Vec<Box<dyn Condition>> = vec![Box::new(OnProperty::new("a")), Box::new(OnMissingProperty::new("b"))];
        assert!(matches_all(&conditions, &ctx).unwrap());

        let conditions: Vec<Box<dyn Condition>> = vec![Box::new(OnProperty::new("a")), Box::new(OnProperty::new("b"))];
        assert!(!matches_all(&conditions, &ctx).unwrap());
        assert!(matches_all(&[], &ctx).unwrap());
    }
}
