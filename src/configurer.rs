use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::{debug, error, info_span};

use crate::{
    bean::{Bean, BeanDefinition, BeanSelector},
    condition::Condition,
    dependency_resolver::DependencyResolver,
    errors::{InstantiateErrorKind, ResolveErrorKind},
    instantiator::next_arg,
    wiring::Wiring,
};

type ConfigureFn = Arc<dyn Fn(&mut Declarations, &mut Wiring<'_>, &[String]) -> Result<(), ResolveErrorKind> + Send + Sync>;

/// A configurer callable: `Fn(&mut Declarations, A1, ..., An) -> Result<(), E>` where every
/// parameter after the first is resolved by the container.
pub trait Configure<Deps>: Send + Sync + 'static {
    /// # Errors
    /// - Returns [`ResolveErrorKind`] if a parameter can't be resolved
    /// - Returns [`ResolveErrorKind::Configurer`] if the callable fails
    fn configure(&self, declarations: &mut Declarations, wiring: &mut Wiring<'_>, args: &[String]) -> Result<(), ResolveErrorKind>;
}

fn configurer_error(wiring: &Wiring<'_>, source: anyhow::Error) -> ResolveErrorKind {
    let err = ResolveErrorKind::Configurer {
        name: wiring.bean_name().to_owned(),
        source: InstantiateErrorKind::Custom(source),
    };
    error!("{}", err);
    err
}

macro_rules! impl_configure {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Err, $($ty,)*> Configure<($($ty,)*)> for F
        where
            F: Fn(&mut Declarations, $($ty,)*) -> Result<(), Err> + Send + Sync + 'static,
            Err: Into<anyhow::Error>,
            $( $ty: DependencyResolver, )*
        {
            #[allow(unused_variables, unused_mut)]
            fn configure(&self, declarations: &mut Declarations, wiring: &mut Wiring<'_>, args: &[String]) -> Result<(), ResolveErrorKind> {
                let mut args = args.iter();
                $( let $ty = $ty::resolve(wiring, next_arg(&mut args))?; )*
                self(declarations, $($ty,)*).map_err(|err| configurer_error(wiring, err.into()))
            }
        }
    };
}

all_the_tuples!(impl_configure);

/// Declarations a configurer may change: new beans and excluded ones.
/// Both are applied once every configurer has run, before beans are wired.
#[derive(Default)]
pub struct Declarations {
    beans: Vec<BeanDefinition>,
    excluded: Vec<BeanSelector>,
}

impl Declarations {
    pub fn register<T: Send + Sync + 'static>(&mut self, bean: Bean<T>) -> &mut Self {
        self.beans.push(bean.into_definition());
        self
    }

    /// Marks every bean chosen by `selector` as deleted.
    pub fn exclude(&mut self, selector: impl Into<BeanSelector>) -> &mut Self {
        self.excluded.push(selector.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty() && self.excluded.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<BeanDefinition>, Vec<BeanSelector>) {
        (self.beans, self.excluded)
    }
}

/// Code run after properties are loaded and beans filtered, but before any bean is wired.
///
/// ```ignore
/// container.configurer(
///     Configurer::new("metrics", |decls: &mut Declarations, enabled: Value<bool>| {
///         if !*enabled {
///             decls.exclude("metricsExporter");
///         }
///         anyhow::Ok(())
///     })
///     .args(["${metrics.enabled:=true}"])
///     .after("logging"),
/// )?;
/// ```
pub struct Configurer {
    name: String,
    before: Vec<String>,
    after: Vec<String>,
    args: Vec<String>,
    pub(crate) conditions: Vec<Box<dyn Condition>>,
    run: ConfigureFn,
}

impl Configurer {
    #[must_use]
    pub fn new<C, Deps>(name: impl Into<String>, configure: C) -> Self
    where
        C: Configure<Deps>,
    {
        Self {
            name: name.into(),
            before: Vec::new(),
            after: Vec::new(),
            args: Vec::new(),
            conditions: Vec::new(),
            run: Arc::new(move |declarations: &mut Declarations, wiring: &mut Wiring<'_>, args: &[String]| {
                configure.configure(declarations, wiring, args)
            }),
        }
    }

    /// Runs before the configurer named `name`.
    #[must_use]
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Runs after the configurer named `name`.
    #[must_use]
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    /// Per-parameter selectors, as in [`crate::Bean::args`]. The declarations parameter has none.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn on(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, declarations: &mut Declarations, wiring: &mut Wiring<'_>) -> Result<(), ResolveErrorKind> {
        let span = info_span!("configure", configurer = %self.name);
        let _guard = span.enter();

        wiring.set_owner(Some(self.name.clone()));
        let result = (self.run)(declarations, wiring, &self.args);
        wiring.set_owner(None);
        debug!(ok = result.is_ok(), "Configurer finished");
        result
    }
}

impl fmt::Debug for Configurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configurer")
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Orders configurers by their `before`/`after` constraints, keeping registration order among
/// unconstrained ones. Names that match no configurer are ignored.
///
/// # Errors
/// Returns [`ResolveErrorKind::CyclicConfigurers`] if the constraints form a cycle.
pub(crate) fn order(configurers: &[&Configurer]) -> Result<Vec<usize>, ResolveErrorKind> {
    let index = |name: &str| configurers.iter().position(|configurer| configurer.name == name);

    let mut successors = vec![Vec::new(); configurers.len()];
    let mut predecessors = vec![Vec::new(); configurers.len()];
    let mut add_edge = |from: usize, to: usize| {
        successors[from].push(to);
        predecessors[to].push(from);
    };
    for (pos, configurer) in configurers.iter().enumerate() {
        for name in &configurer.before {
            match index(name) {
                Some(other) => add_edge(pos, other),
                None => debug!(configurer = %configurer.name, before = %name, "Unknown configurer ignored"),
            }
        }
        for name in &configurer.after {
            match index(name) {
                Some(other) => add_edge(other, pos),
                None => debug!(configurer = %configurer.name, after = %name, "Unknown configurer ignored"),
            }
        }
    }

    let mut in_degree = predecessors.iter().map(Vec::len).collect::<Vec<_>>();
    let mut ready = (0..configurers.len()).filter(|pos| in_degree[*pos] == 0).collect::<BTreeSet<_>>();
    let mut sorted = Vec::with_capacity(configurers.len());
    while let Some(pos) = ready.pop_first() {
        sorted.push(pos);
        for next in &successors[pos] {
            in_degree[*next] -= 1;
            if in_degree[*next] == 0 {
                ready.insert(*next);
            }
        }
    }
    if sorted.len() == configurers.len() {
        return Ok(sorted);
    }

    // Every remaining configurer has a remaining predecessor, so walking predecessors must loop
    let remaining = |pos: &usize| in_degree[*pos] > 0;
    let mut walk = Vec::new();
    let mut current = (0..configurers.len()).find(remaining).unwrap_or_default();
    while !walk.contains(&current) {
        walk.push(current);
        current = predecessors[current].iter().copied().find(remaining).unwrap_or(current);
    }
    // The walk goes against the edges, so the cycle reads backwards from `current`
    let start = walk.iter().position(|pos| *pos == current).unwrap_or_default();
    let path = [current]
        .into_iter()
        .chain(walk[start + 1..].iter().rev().copied())
        .chain([current])
        .map(|pos| configurers[pos].name.clone())
        .collect::<Vec<_>>();

    let err = ResolveErrorKind::CyclicConfigurers { path };
    error!("{}", err);
    Err(err)
}
