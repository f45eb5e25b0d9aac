mod interpolate;
mod layered;
mod path;
mod storage;
mod store;
mod value;

pub use interpolate::resolve;
pub(crate) use interpolate::{find_closing, split_default};
pub use layered::{Layer, LayerKind, LayeredProperties, PropertyReader};
pub use path::{child_key, is_descendant_or_self, join_path, split_path, PathSegment};
pub use storage::{NodeKind, Properties};
pub use store::PropertyStore;
pub use value::PropValue;
