use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use std::{any::type_name, time::Duration};

use super::{bind_scalar, Bind, BindContext, BindParam};
use crate::errors::BindErrorKind;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Splits `value >> format` into the value and the inline format, if any.
#[must_use]
pub fn split_format(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(">>") {
        Some((val, format)) => (val.trim(), Some(format.trim())),
        None => (raw.trim(), None),
    }
}

fn unix_seconds(val: &str) -> Option<i64> {
    if val.is_empty() || !val.bytes().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    val.parse().ok()
}

fn parse_err<T>(key: &str, raw: &str, reason: impl ToString) -> BindErrorKind {
    BindErrorKind::Parse {
        key: key.to_owned(),
        value: raw.to_owned(),
        ty: type_name::<T>(),
        reason: reason.to_string(),
    }
}

fn from_unix<T>(key: &str, raw: &str, secs: i64) -> Result<DateTime<Utc>, BindErrorKind> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| parse_err::<T>(key, raw, "timestamp out of range"))
}

macro_rules! scalar_bind {
    () => {
        const SCALAR: bool = true;

        #[inline]
        fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
            bind_scalar(ctx, param)
        }
    };
}

/// Human-readable durations such as `1h 30m`, `500ms` or `2days`.
impl Bind for Duration {
    scalar_bind!();

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        humantime::parse_duration(raw.trim()).map_err(|err| parse_err::<Self>(key, raw, err))
    }
}

impl Bind for NaiveDate {
    scalar_bind!();

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        let (val, format) = split_format(raw);
        if let Some(secs) = unix_seconds(val) {
            return Ok(from_unix::<Self>(key, raw, secs)?.date_naive());
        }
        NaiveDate::parse_from_str(val, format.unwrap_or(DATE_FORMAT)).map_err(|err| parse_err::<Self>(key, raw, err))
    }
}

impl Bind for NaiveDateTime {
    scalar_bind!();

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        let (val, format) = split_format(raw);
        if let Some(secs) = unix_seconds(val) {
            return Ok(from_unix::<Self>(key, raw, secs)?.naive_utc());
        }
        NaiveDateTime::parse_from_str(val, format.unwrap_or(DATE_TIME_FORMAT)).map_err(|err| parse_err::<Self>(key, raw, err))
    }
}

/// RFC 3339 by default. An inline format without an offset is read as UTC.
impl Bind for DateTime<FixedOffset> {
    scalar_bind!();

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        let (val, format) = split_format(raw);
        if let Some(secs) = unix_seconds(val) {
            return Ok(from_unix::<Self>(key, raw, secs)?.fixed_offset());
        }
        match format {
            None => DateTime::parse_from_rfc3339(val).map_err(|err| parse_err::<Self>(key, raw, err)),
            Some(format) => DateTime::parse_from_str(val, format)
                .or_else(|_| NaiveDateTime::parse_from_str(val, format).map(|naive| naive.and_utc().fixed_offset()))
                .map_err(|err| parse_err::<Self>(key, raw, err)),
        }
    }
}

impl Bind for DateTime<Utc> {
    scalar_bind!();

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        DateTime::<FixedOffset>::parse(key, raw)
            .map(|val| val.with_timezone(&Utc))
            .map_err(|err| match err {
                BindErrorKind::Parse { key, value, reason, .. } => BindErrorKind::Parse {
                    key,
                    value,
                    ty: type_name::<Self>(),
                    reason,
                },
                err => err,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::split_format;
    use crate::{bind::Bind, errors::BindErrorKind};

    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
    use std::time::Duration;

    #[test]
    fn test_split_format() {
        assert_eq!(split_format("2017-06-17 >> %Y-%m-%d"), ("2017-06-17", Some("%Y-%m-%d")));
        assert_eq!(split_format(" 2017-06-17 "), ("2017-06-17", None));
    }

    #[test]
    fn test_duration() {
        assert_eq!(Duration::parse("k", "1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(Duration::parse("k", "250ms").unwrap(), Duration::from_millis(250));
        assert!(matches!(Duration::parse("k", "soon"), Err(BindErrorKind::Parse { .. })));
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2017, 6, 17).unwrap();
        assert_eq!(NaiveDate::parse("k", "2017-06-17").unwrap(), date);
        assert_eq!(NaiveDate::parse("k", "17/06/2017 >> %d/%m/%Y").unwrap(), date);

        let date_time = date.and_hms_opt(13, 20, 15).unwrap();
        assert_eq!(NaiveDateTime::parse("k", "2017-06-17 13:20:15").unwrap(), date_time);
        assert_eq!(
            NaiveDateTime::parse("k", "2017/06/17T13:20:15 >> %Y/%m/%dT%H:%M:%S").unwrap(),
            date_time
        );
        assert_eq!(NaiveDateTime::parse("k", "1497705615").unwrap(), date_time);
    }

    #[test]
    fn test_date_times() {
        let utc = DateTime::<Utc>::parse("k", "2017-06-17T13:20:15Z").unwrap();
        assert_eq!(utc.timestamp(), 1_497_705_615);
        assert_eq!(DateTime::<Utc>::parse("k", "1497705615").unwrap(), utc);

        let offset = DateTime::<FixedOffset>::parse("k", "2017-06-17T15:20:15+02:00").unwrap();
        assert_eq!(offset, utc);
        assert_eq!(
            DateTime::<FixedOffset>::parse("k", "2017-06-17 13:20:15 >> %Y-%m-%d %H:%M:%S").unwrap(),
            utc
        );
        assert!(matches!(
            DateTime::<Utc>::parse("k", "yesterday"),
            Err(BindErrorKind::Parse { ty, .. }) if ty.contains("Utc")
        ));
    }
}
