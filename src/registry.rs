use std::any::{type_name, TypeId};
use tracing::{debug, error};

use crate::{
    bean::{BeanDefinition, BeanId, BeanSelector, BeanState},
    errors::{ContainerErrorKind, ResolveErrorKind},
};

/// Bean definitions in registration order. Definitions are never removed, only marked deleted.
#[derive(Default, Debug)]
pub struct Registry {
    beans: Vec<BeanDefinition>,
}

impl Registry {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { beans: Vec::new() }
    }

    /// Adds `def`, generating its name from the type if none is set.
    ///
    /// # Errors
    /// Returns [`ContainerErrorKind::Duplicate`] if a live bean with the same name and type exists.
    pub fn register(&mut self, mut def: BeanDefinition) -> Result<BeanId, ContainerErrorKind> {
        match &def.name {
            Some(name) => {
                if self.live().any(|bean| bean.type_id == def.type_id && bean.name() == name) {
                    let err = ContainerErrorKind::Duplicate {
                        name: name.clone(),
                        ty: def.type_name,
                    };
                    error!("{}", err);
                    return Err(err);
                }
            }
            None => def.name = Some(self.generate_name(def.type_name)),
        }

        let id = BeanId(self.beans.len());
        def.id = id;
        def.state = BeanState::Unresolved;
        debug!(%id, name = def.name(), ty = def.type_name, "Bean registered");
        self.beans.push(def);
        Ok(id)
    }

    /// The short type name, suffixed with `#n` if another bean already took it.
    fn generate_name(&self, type_name: &str) -> String {
        let base = short_type_name(type_name);
        let taken = |name: &str| self.beans.iter().any(|bean| bean.name() == name);
        if !taken(base) {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}#{n}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| base.to_owned())
    }

    /// Live beans chosen by `selector`, in registration order.
    #[must_use]
    pub fn find(&self, selector: &BeanSelector) -> Vec<&BeanDefinition> {
        self.live().filter(|bean| bean.matches(selector)).collect()
    }

    /// Every definition, deleted ones included, in registration order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &BeanDefinition> {
        self.beans.iter()
    }

    #[inline]
    pub(crate) fn live(&self) -> impl Iterator<Item = &BeanDefinition> {
        self.beans.iter().filter(|bean| bean.state != BeanState::Deleted)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: BeanId) -> Option<&BeanDefinition> {
        self.beans.get(id.0)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: BeanId) -> Option<&mut BeanDefinition> {
        self.beans.get_mut(id.0)
    }

    pub fn mark_deleted(&mut self, id: BeanId) {
        if let Some(bean) = self.beans.get_mut(id.0) {
            bean.state = BeanState::Deleted;
            bean.instance = None;
            debug!(%id, name = bean.name(), "Bean deleted");
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    /// Live beans selectable as `T`, further narrowed by `selector`.
    pub(crate) fn candidates<T: ?Sized + 'static>(&self, selector: Option<&BeanSelector>) -> Vec<BeanId> {
        let type_id = TypeId::of::<T>();
        self.live()
            .filter(|bean| bean.is_exporting(type_id))
            .filter(|bean| selector.map_or(true, |selector| bean.matches(selector)))
            .map(BeanDefinition::id)
            .collect()
    }

    /// Picks one of `candidates`: the only one, or the only primary one.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::Ambiguous`] if several candidates remain.
    pub(crate) fn pick_one(&self, candidates: &[BeanId], selector: &str) -> Result<Option<BeanId>, ResolveErrorKind> {
        match candidates {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => {
                let primaries = candidates
                    .iter()
                    .filter(|id| self.get(**id).is_some_and(BeanDefinition::is_primary))
                    .collect::<Vec<_>>();
                if let [id] = primaries.as_slice() {
                    debug!(selector, "Primary bean chosen");
                    return Ok(Some(**id));
                }
                let err = ResolveErrorKind::Ambiguous {
                    selector: selector.to_owned(),
                    candidates: candidates
                        .iter()
                        .filter_map(|id| self.get(*id))
                        .map(|bean| bean.name().to_owned())
                        .collect(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

/// `my_app::repo::Repo<u8>` -> `Repo`
fn short_type_name(type_name: &str) -> &str {
    let path = type_name.split('<').next().unwrap_or(type_name);
    path.rsplit("::").next().unwrap_or(path)
}

/// Describes a selector for errors: the requested type plus the selector string, if any.
pub(crate) fn describe<T: ?Sized>(selector: Option<&str>) -> String {
    match selector {
        Some(selector) => format!("{} `{selector}`", type_name::<T>()),
        None => type_name::<T>().to_owned(),
    }
}
