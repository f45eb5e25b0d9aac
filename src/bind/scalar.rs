use std::{any::type_name, path::PathBuf};

use super::{bind_scalar, Bind, BindContext, BindParam};
use crate::errors::BindErrorKind;

fn parse_err<T>(key: &str, raw: &str, reason: impl ToString) -> BindErrorKind {
    BindErrorKind::Parse {
        key: key.to_owned(),
        value: raw.to_owned(),
        ty: type_name::<T>(),
        reason: reason.to_string(),
    }
}

/// Splits an optional `0x`/`0o`/`0b` radix prefix, keeping the sign.
fn radix_of(raw: &str) -> (String, u32) {
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (digits, radix) = match digits.get(..2) {
        Some("0x" | "0X") => (&digits[2..], 16),
        Some("0o" | "0O") => (&digits[2..], 8),
        Some("0b" | "0B") => (&digits[2..], 2),
        _ => (digits, 10),
    };
    (format!("{sign}{}", digits.replace('_', "")), radix)
}

macro_rules! impl_bind_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Bind for $ty {
                const SCALAR: bool = true;

                #[inline]
                fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
                    bind_scalar(ctx, param)
                }

                fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
                    let (digits, radix) = radix_of(raw.trim());
                    <$ty>::from_str_radix(&digits, radix).map_err(|err| parse_err::<Self>(key, raw, err))
                }
            }
        )*
    };
}

impl_bind_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! impl_bind_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Bind for $ty {
                const SCALAR: bool = true;

                #[inline]
                fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
                    bind_scalar(ctx, param)
                }

                fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
                    raw.trim().parse::<$ty>().map_err(|err| parse_err::<Self>(key, raw, err))
                }
            }
        )*
    };
}

impl_bind_from_str!(f32, f64, char);

impl Bind for bool {
    const SCALAR: bool = true;

    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        bind_scalar(ctx, param)
    }

    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        match raw.trim() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            _ => Err(parse_err::<Self>(key, raw, "expected a boolean")),
        }
    }
}

impl Bind for String {
    const SCALAR: bool = true;

    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        bind_scalar(ctx, param)
    }

    #[inline]
    fn parse(_key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        Ok(raw.to_owned())
    }
}

impl Bind for PathBuf {
    const SCALAR: bool = true;

    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        bind_scalar(ctx, param)
    }

    #[inline]
    fn parse(_key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        Ok(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::Bind;
    use crate::{
        bind::{bind_value, BindContext, BindParam, Converters},
        errors::BindErrorKind,
        properties::Properties,
    };

    use std::path::PathBuf;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(i32::parse("k", "-42").unwrap(), -42);
        assert_eq!(u16::parse("k", "0x1F").unwrap(), 31);
        assert_eq!(i64::parse("k", "-0b101").unwrap(), -5);
        assert_eq!(u32::parse("k", "1_000").unwrap(), 1000);
        assert_eq!(f64::parse("k", " 2.5 ").unwrap(), 2.5);
        assert!(matches!(u8::parse("k", "256"), Err(BindErrorKind::Parse { .. })));
        assert!(matches!(u8::parse("k", "-1"), Err(BindErrorKind::Parse { .. })));
    }

    #[test]
    fn test_parse_bool() {
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(bool::parse("k", raw).unwrap());
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(!bool::parse("k", raw).unwrap());
        }
        assert!(matches!(bool::parse("k", "yes"), Err(BindErrorKind::Parse { .. })));
    }

    #[test]
    #[traced_test]
    fn test_bind_scalars() {
        let props = Properties::from_pairs([("port", "8080"), ("dir", "${home}/log"), ("home", "/var")]).unwrap();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        assert_eq!(bind_value::<u16>(&ctx, &BindParam::new("port")).unwrap(), 8080);
        assert_eq!(bind_value::<PathBuf>(&ctx, &BindParam::new("dir")).unwrap(), PathBuf::from("/var/log"));
        assert_eq!(bind_value::<i32>(&ctx, &BindParam::new("missing").with_default("3")).unwrap(), 3);
        assert!(matches!(
            bind_value::<i32>(&ctx, &BindParam::new("missing")),
            Err(BindErrorKind::NotFound { key }) if key == "missing"
        ));
    }

    #[test]
    #[traced_test]
    fn test_validate() {
        let props = Properties::from_pairs([("port", "80")]).unwrap();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        let param = BindParam::new("port").with_validate("$ >= 1024");
        assert!(matches!(bind_value::<u16>(&ctx, &param), Err(BindErrorKind::ValidationFailed { .. })));

        let param = BindParam::new("port").with_validate("$ > 0 && $ < 65536");
        assert_eq!(bind_value::<u16>(&ctx, &param).unwrap(), 80);

        let param = BindParam::new("port").with_validate("$ +");
        assert!(matches!(bind_value::<u16>(&ctx, &param), Err(BindErrorKind::Expr { .. })));
    }

    #[test]
    #[traced_test]
    fn test_converter() {
        #[derive(Debug, PartialEq)]
        struct Level(u8);

        impl Bind for Level {
            const SCALAR: bool = true;

            fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
                crate::bind::bind_scalar(ctx, param)
            }
        }

        let props = Properties::from_pairs([("level", "high"), ("levels", "low,high")]).unwrap();
        let mut converters = Converters::new();
        converters.register(|raw: &str| match raw {
            "low" => Ok(Level(1)),
            "high" => Ok(Level(9)),
            _ => Err(anyhow::anyhow!("unknown level `{raw}`")),
        });
        let ctx = BindContext::new(&props, &converters);

        assert_eq!(bind_value::<Level>(&ctx, &BindParam::new("level")).unwrap(), Level(9));
        assert_eq!(
            bind_value::<Vec<Level>>(&ctx, &BindParam::new("levels")).unwrap(),
            vec![Level(1), Level(9)]
        );
        assert!(matches!(
            bind_value::<Level>(&ctx, &BindParam::new("x").with_default("mid")),
            Err(BindErrorKind::Converter { .. })
        ));
    }
}
