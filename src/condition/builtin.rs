use std::fmt;
use tracing::debug;

use super::{Condition, ConditionContext};
use crate::{
    bean::BeanSelector,
    boot::PROFILE_KEY,
    errors::ConditionErrorKind,
    expr::{eval_bool, Dollar, Value},
};

/// Prefixes of `having_value` marking a boolean expression over the value, bound to `$`.
const EXPR_PREFIXES: [&str; 2] = ["go:", "expr:"];

/// Matches if the property is present and, when `having_value` is set, equal to it.
#[derive(Debug, Clone)]
pub struct OnProperty {
    name: String,
    having_value: Option<String>,
    match_if_missing: bool,
}

impl OnProperty {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            having_value: None,
            match_if_missing: false,
        }
    }

    /// The expected value, or `expr:<expression>` to test the value with an expression, e.g. `expr:$ > 3`.
    #[inline]
    #[must_use]
    pub fn having_value(mut self, val: impl Into<String>) -> Self {
        self.having_value = Some(val.into());
        self
    }

    /// The result when the property is absent, `false` by default.
    #[inline]
    #[must_use]
    pub fn match_if_missing(mut self, val: bool) -> Self {
        self.match_if_missing = val;
        self
    }
}

impl Condition for OnProperty {
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        if !ctx.has(&self.name) {
            return Ok(self.match_if_missing);
        }
        let Some(expected) = &self.having_value else {
            return Ok(true);
        };
        let Some(raw) = ctx.prop(&self.name) else {
            debug!(name = %self.name, "Property isn't a value");
            return Ok(false);
        };
        let val = ctx.resolve(raw)?;

        match EXPR_PREFIXES.iter().find_map(|prefix| expected.strip_prefix(prefix)) {
            Some(expr) => eval_bool(expr, &Dollar(Value::infer(&val))).map_err(|source| ConditionErrorKind::Expr {
                expr: expr.to_owned(),
                source,
            }),
            None => Ok(val == *expected),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OnMissingProperty {
    name: String,
}

impl OnMissingProperty {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Condition for OnMissingProperty {
    #[inline]
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        Ok(!ctx.has(&self.name))
    }
}

macro_rules! bean_condition {
    ($(#[$meta:meta])* $name:ident, |$count:ident| $check:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            selector: BeanSelector,
        }

        impl $name {
            #[inline]
            #[must_use]
            pub fn new(selector: impl Into<BeanSelector>) -> Self {
                Self {
                    selector: selector.into(),
                }
            }

            /// Selects by concrete type or exported interface.
            #[inline]
            #[must_use]
            pub fn of<T: ?Sized + 'static>() -> Self {
                Self::new(BeanSelector::of::<T>())
            }
        }

        impl Condition for $name {
            fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
                let $count = ctx.find(&self.selector)?.len();
                Ok($check)
            }
        }
    };
}

bean_condition!(
    /// Matches if at least one bean is selected.
    OnBean,
    |count| count > 0
);
bean_condition!(
    /// Matches if no bean is selected.
    OnMissingBean,
    |count| count == 0
);
bean_condition!(
    /// Matches if exactly one bean is selected.
    OnSingleBean,
    |count| count == 1
);

/// Matches if `profile` is one of the comma-separated active profiles.
#[derive(Debug, Clone)]
pub struct OnProfile {
    profile: String,
}

impl OnProfile {
    #[inline]
    #[must_use]
    pub fn new(profile: impl Into<String>) -> Self {
        Self { profile: profile.into() }
    }
}

impl Condition for OnProfile {
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        let Some(raw) = ctx.prop(PROFILE_KEY) else {
            return Ok(false);
        };
        let active = ctx.resolve(raw)?;
        Ok(active.split(',').map(str::trim).any(|profile| profile == self.profile))
    }
}

/// Matches if the expression is `true` after `${...}` references are resolved.
/// Identifiers in the expression read property values, e.g. `server.port > 1024`.
#[derive(Debug, Clone)]
pub struct OnExpression {
    expr: String,
}

impl OnExpression {
    #[inline]
    #[must_use]
    pub fn new(expr: impl Into<String>) -> Self {
        Self { expr: expr.into() }
    }
}

impl Condition for OnExpression {
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        let resolved = ctx.resolve(&self.expr)?;
        let vars = |name: &str| ctx.prop(name).map(Value::infer);
        eval_bool(&resolved, &vars).map_err(|source| ConditionErrorKind::Expr { expr: resolved, source })
    }
}

/// An arbitrary predicate.
pub struct OnMatches<F> {
    predicate: F,
}

impl<F> OnMatches<F>
where
    F: Fn(&ConditionContext<'_>) -> Result<bool, anyhow::Error> + Send + Sync,
{
    #[inline]
    #[must_use]
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> Condition for OnMatches<F>
where
    F: Fn(&ConditionContext<'_>) -> Result<bool, anyhow::Error> + Send + Sync,
{
    #[inline]
    fn matches(&self, ctx: &ConditionContext<'_>) -> Result<bool, ConditionErrorKind> {
        (self.predicate)(ctx).map_err(ConditionErrorKind::Custom)
    }
}

impl<F> fmt::Debug for OnMatches<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnMatches").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{OnBean, OnExpression, OnMatches, OnMissingBean, OnMissingProperty, OnProfile, OnProperty, OnSingleBean};
    use crate::{
        bean::Bean,
        condition::{tests::props, Condition, ConditionContext},
        errors::ConditionErrorKind,
        registry::Registry,
    };

    use tracing_test::traced_test;

    trait Cache: Send + Sync {}

    struct Redis;

    impl Cache for Redis {}

    #[test]
    #[traced_test]
    fn test_on_property() {
        let props = props(&[("enabled", "true"), ("port", "${base}"), ("base", "8080"), ("pool.size", "4")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(OnProperty::new("enabled").matches(&ctx).unwrap());
        assert!(OnProperty::new("pool").matches(&ctx).unwrap());
        assert!(!OnProperty::new("missing").matches(&ctx).unwrap());
        assert!(OnProperty::new("missing").match_if_missing(true).matches(&ctx).unwrap());
        assert!(OnProperty::new("enabled").having_value("true").matches(&ctx).unwrap());
        assert!(!OnProperty::new("enabled").having_value("false").matches(&ctx).unwrap());
        assert!(OnProperty::new("port").having_value("8080").matches(&ctx).unwrap());
        assert!(OnProperty::new("port").having_value("expr:$ > 1024").matches(&ctx).unwrap());
        assert!(OnProperty::new("pool.size").having_value("go:$ >= 2 && $ < 8").matches(&ctx).unwrap());
        assert!(!OnProperty::new("pool").having_value("4").matches(&ctx).unwrap());
        assert!(matches!(
            OnProperty::new("port").having_value("expr:$ >").matches(&ctx),
            Err(ConditionErrorKind::Expr { .. })
        ));

        assert!(OnMissingProperty::new("missing").matches(&ctx).unwrap());
        assert!(!OnMissingProperty::new("pool").matches(&ctx).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_on_bean() {
        let props = props(&[]);
        let mut registry = Registry::new();
        registry
            .register(Bean::object(Redis).name("redis").export::<dyn Cache>(|bean| bean).into_definition())
            .unwrap();
        registry.register(Bean::object(1_u8).name("one").into_definition()).unwrap();
        registry.register(Bean::object(2_u8).name("two").into_definition()).unwrap();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(OnBean::new("redis").matches(&ctx).unwrap());
        assert!(OnBean::of::<dyn Cache>().matches(&ctx).unwrap());
        assert!(!OnBean::new("memcached").matches(&ctx).unwrap());
        assert!(OnMissingBean::new("memcached").matches(&ctx).unwrap());
        assert!(!OnMissingBean::of::<u8>().matches(&ctx).unwrap());
        assert!(OnSingleBean::of::<Redis>().matches(&ctx).unwrap());
        assert!(!OnSingleBean::of::<u8>().matches(&ctx).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_on_profile() {
        let props = props(&[("spring.profiles.active", "dev, test")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(OnProfile::new("dev").matches(&ctx).unwrap());
        assert!(OnProfile::new("test").matches(&ctx).unwrap());
        assert!(!OnProfile::new("prod").matches(&ctx).unwrap());

        let empty = crate::condition::tests::props(&[]);
        let ctx = ConditionContext::new(&empty, &registry);
        assert!(!OnProfile::new("dev").matches(&ctx).unwrap());
    }

    #[test]
    #[traced_test]
    fn test_on_expression() {
        let props = props(&[("server.port", "8080"), ("mode", "fast")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(OnExpression::new("server.port > 1024 && mode == \"fast\"").matches(&ctx).unwrap());
        assert!(OnExpression::new("${server.port} == 8080").matches(&ctx).unwrap());
        assert!(!OnExpression::new("${missing:=0} > 1").matches(&ctx).unwrap());
        assert!(matches!(
            OnExpression::new("${missing} > 1").matches(&ctx),
            Err(ConditionErrorKind::Property(_))
        ));
        assert!(matches!(
            OnExpression::new("unknown > 1").matches(&ctx),
            Err(ConditionErrorKind::Expr { .. })
        ));
    }

    #[test]
    fn test_on_matches() {
        let props = props(&[("a", "1")]);
        let registry = Registry::new();
        let ctx = ConditionContext::new(&props, &registry);

        assert!(OnMatches::new(|ctx: &ConditionContext<'_>| Ok(ctx.has("a"))).matches(&ctx).unwrap());
        assert!(matches!(
            OnMatches::new(|_: &ConditionContext<'_>| Err(anyhow::anyhow!("boom"))).matches(&ctx),
            Err(ConditionErrorKind::Custom(_))
        ));
    }
}
