use crate::{dependency_resolver::DependencyResolver, errors::ResolveErrorKind, wiring::Wiring};

/// A bean factory: a closure whose parameters are resolved by the container.
///
/// `args` holds the per-parameter selectors set with [`crate::Bean::args`]; an empty or missing
/// entry resolves the parameter by its type alone.
pub trait Instantiator<Deps>: Send + Sync + 'static {
    type Provides: Send + Sync + 'static;

    /// # Errors
    /// - Returns [`ResolveErrorKind`] if a parameter can't be resolved
    /// - Returns [`ResolveErrorKind::FactoryReturnedError`] if the closure fails
    fn instantiate(&self, wiring: &mut Wiring<'_>, args: &[String]) -> Result<Self::Provides, ResolveErrorKind>;
}

/// Selector of the parameter at the current position, `None` if it isn't set.
pub(crate) fn next_arg<'a>(args: &mut impl Iterator<Item = &'a String>) -> Option<&'a str> {
    args.next().map(String::as_str).filter(|arg| !arg.trim().is_empty())
}

macro_rules! impl_instantiator {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Response, Err, $($ty,)*> Instantiator<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Result<Response, Err> + Send + Sync + 'static,
            Response: Send + Sync + 'static,
            Err: Into<anyhow::Error>,
            $( $ty: DependencyResolver, )*
        {
            type Provides = Response;

            #[allow(unused_variables, unused_mut)]
            fn instantiate(&self, wiring: &mut Wiring<'_>, args: &[String]) -> Result<Self::Provides, ResolveErrorKind> {
                let mut args = args.iter();
                $( let $ty = $ty::resolve(wiring, next_arg(&mut args))?; )*
                self($($ty,)*).map_err(|err| wiring.factory_error(err.into()))
            }
        }
    };
}

all_the_tuples!(impl_instantiator);
