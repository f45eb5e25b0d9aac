use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    time::Duration,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};

/// A structured value accepted by [`super::Properties::set`].
///
/// Maps become `prefix.k` leaf keys, sequences of scalars are joined by comma at the key itself
/// and sequences of structures become indexed `prefix[i]` sub-keys.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Scalar(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    #[inline]
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Builds a map value from key/value pairs.
    #[must_use]
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropValue>,
    {
        Self::Map(entries.into_iter().map(|(key, val)| (key.into(), val.into())).collect())
    }
}

macro_rules! impl_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PropValue {
                #[inline]
                fn from(val: $ty) -> Self {
                    Self::Scalar(val.to_string())
                }
            }
        )*
    };
}

impl_from_display!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String, NaiveDate);

impl From<&str> for PropValue {
    #[inline]
    fn from(val: &str) -> Self {
        Self::Scalar(val.to_owned())
    }
}

impl From<&String> for PropValue {
    #[inline]
    fn from(val: &String) -> Self {
        Self::Scalar(val.clone())
    }
}

impl From<PathBuf> for PropValue {
    #[inline]
    fn from(val: PathBuf) -> Self {
        Self::Scalar(val.display().to_string())
    }
}

impl From<Duration> for PropValue {
    #[inline]
    fn from(val: Duration) -> Self {
        Self::Scalar(humantime::format_duration(val).to_string())
    }
}

impl From<NaiveDateTime> for PropValue {
    #[inline]
    fn from(val: NaiveDateTime) -> Self {
        Self::Scalar(val.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl<Tz> From<DateTime<Tz>> for PropValue
where
    Tz: TimeZone,
    Tz::Offset: core::fmt::Display,
{
    #[inline]
    fn from(val: DateTime<Tz>) -> Self {
        Self::Scalar(val.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    #[inline]
    fn from(val: Vec<T>) -> Self {
        Self::List(val.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PropValue>, const N: usize> From<[T; N]> for PropValue {
    #[inline]
    fn from(val: [T; N]) -> Self {
        Self::List(val.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, T: Into<PropValue>> From<BTreeMap<K, T>> for PropValue {
    #[inline]
    fn from(val: BTreeMap<K, T>) -> Self {
        Self::map(val)
    }
}

impl<K: Into<String>, T: Into<PropValue>, S> From<HashMap<K, T, S>> for PropValue {
    #[inline]
    fn from(val: HashMap<K, T, S>) -> Self {
        Self::map(val)
    }
}
