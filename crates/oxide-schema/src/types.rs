//! Column type vocabulary.
//!
//! Column types are written as text in schema files (`"uuid"`,
//! `"varchar(255)"`, `"numeric(10,2)"`, `"text[]"`, `"int4[3]"`) and parsed
//! into [`ColumnType`] against a closed set of supported spellings. The
//! [`Display`](fmt::Display) implementation produces the canonical spelling,
//! which is also what the type serializes to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// A non-array column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single precision float.
    Real,
    /// Double precision float.
    DoublePrecision,
    /// Arbitrary precision number, optionally with precision and scale.
    Numeric(Option<(u16, Option<u16>)>),
    /// Boolean.
    Boolean,
    /// Unbounded text.
    Text,
    /// Variable-length character string with optional max length.
    Varchar(Option<u32>),
    /// Fixed-length character string.
    Char(Option<u32>),
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// Date only.
    Date,
    /// Time of day without time zone.
    Time,
    /// Time of day with time zone.
    TimeTz,
    /// Time interval.
    Interval,
    /// Binary data.
    Bytea,
    /// UUID.
    Uuid,
    /// JSON text.
    Json,
    /// Binary JSON.
    Jsonb,
    /// A range type.
    Range(RangeKind),
    /// A multirange type.
    Multirange(RangeKind),
}

/// Element type of a range or multirange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// Range of 32-bit integers.
    Int4,
    /// Range of 64-bit integers.
    Int8,
    /// Range of numerics.
    Num,
    /// Range of timestamps.
    Ts,
    /// Range of timestamps with time zone.
    TsTz,
    /// Range of dates.
    Date,
}

impl RangeKind {
    const ALL: [Self; 6] = [
        Self::Int4,
        Self::Int8,
        Self::Num,
        Self::Ts,
        Self::TsTz,
        Self::Date,
    ];

    /// Returns the spelling prefix, e.g. `tstz` for `tstzrange`.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Num => "num",
            Self::Ts => "ts",
            Self::TsTz => "tstz",
            Self::Date => "date",
        }
    }
}

/// A column type: a scalar, or an array of a scalar with an optional fixed
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// A plain scalar type.
    Scalar(ScalarType),
    /// An array of scalars. Arrays of arrays are not representable.
    Array {
        /// Element type.
        base: ScalarType,
        /// Fixed length, if declared.
        len: Option<u32>,
    },
}

impl ColumnType {
    /// Returns the scalar element type (the type itself for scalars).
    #[must_use]
    pub fn base(&self) -> ScalarType {
        match self {
            Self::Scalar(base) | Self::Array { base, .. } => *base,
        }
    }

    /// Returns true for array types.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }
}

impl From<ScalarType> for ColumnType {
    fn from(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }
}

/// Parses a column type spelling.
///
/// Accepts the canonical spellings plus common aliases (`int`, `int4`,
/// `bool`, `decimal`, `character varying`, `timestamp with time zone`, ...),
/// case-insensitively. Array types use the `Base[]` / `Base[N]` suffix.
pub fn parse_column_type(text: &str) -> Result<ColumnType> {
    let invalid = |reason: &str| SchemaError::InvalidType {
        spelling: text.to_string(),
        reason: reason.to_string(),
    };

    let normalized = normalize(text);
    if normalized.is_empty() {
        return Err(invalid("empty type"));
    }

    let Some(open) = normalized.find('[') else {
        return parse_scalar(&normalized).map(ColumnType::Scalar).map_err(|r| invalid(&r));
    };

    let (base_text, suffix) = normalized.split_at(open);
    let Some(inner) = suffix.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(invalid("malformed array suffix"));
    };
    if inner.contains('[') || inner.contains(']') {
        return Err(invalid("arrays of arrays are not supported"));
    }
    let len = if inner.is_empty() {
        None
    } else {
        Some(parse_length(inner).map_err(|r| invalid(&r))?)
    };
    let base = parse_scalar(base_text.trim_end()).map_err(|r| invalid(&r))?;
    Ok(ColumnType::Array { base, len })
}

/// Lowercases, trims and collapses whitespace runs into single spaces, and
/// removes whitespace around punctuation.
fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            let next_is_punct = matches!(chars.peek(), Some('(' | ')' | ',' | '[' | ']'));
            let prev_is_punct = matches!(out.chars().last(), Some('(' | ',' | '['));
            if next_is_punct || prev_is_punct {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn parse_length(text: &str) -> std::result::Result<u32, String> {
    match text.parse::<u32>() {
        Ok(0) => Err("length must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{text}' is not a valid length")),
    }
}

/// Splits `name(args)` into `("name", Some("args"))`.
fn split_params(text: &str) -> std::result::Result<(&str, Option<&str>), String> {
    match text.find('(') {
        None => Ok((text, None)),
        Some(open) => {
            let args = text[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| "unbalanced parentheses".to_string())?;
            if args.contains('(') || args.contains(')') {
                return Err("unbalanced parentheses".to_string());
            }
            Ok((text[..open].trim_end(), Some(args)))
        }
    }
}

fn parse_scalar(text: &str) -> std::result::Result<ScalarType, String> {
    let (name, args) = split_params(text)?;

    let length = |args: Option<&str>| args.map(parse_length).transpose();
    let no_args = |scalar: ScalarType| match args {
        None => Ok(scalar),
        Some(_) => Err(format!("type '{name}' takes no parameters")),
    };

    match name {
        "smallint" | "int2" => no_args(ScalarType::SmallInt),
        "integer" | "int" | "int4" => no_args(ScalarType::Integer),
        "bigint" | "int8" => no_args(ScalarType::BigInt),
        "real" | "float4" => no_args(ScalarType::Real),
        "double precision" | "double" | "float8" => no_args(ScalarType::DoublePrecision),
        "numeric" | "decimal" => Ok(ScalarType::Numeric(args.map(parse_numeric).transpose()?)),
        "boolean" | "bool" => no_args(ScalarType::Boolean),
        "text" => no_args(ScalarType::Text),
        "varchar" | "character varying" => Ok(ScalarType::Varchar(length(args)?)),
        "char" | "character" => Ok(ScalarType::Char(length(args)?)),
        "timestamp" | "timestamp without time zone" => no_args(ScalarType::Timestamp),
        "timestamptz" | "timestamp with time zone" => no_args(ScalarType::TimestampTz),
        "date" => no_args(ScalarType::Date),
        "time" | "time without time zone" => no_args(ScalarType::Time),
        "timetz" | "time with time zone" => no_args(ScalarType::TimeTz),
        "interval" => no_args(ScalarType::Interval),
        "bytea" | "binary" => no_args(ScalarType::Bytea),
        "uuid" => no_args(ScalarType::Uuid),
        "json" => no_args(ScalarType::Json),
        "jsonb" => no_args(ScalarType::Jsonb),
        other => {
            for kind in RangeKind::ALL {
                if let Some(rest) = other.strip_prefix(kind.prefix()) {
                    match rest {
                        "range" => return no_args(ScalarType::Range(kind)),
                        "multirange" => return no_args(ScalarType::Multirange(kind)),
                        _ => {}
                    }
                }
            }
            Err(format!("unknown type '{other}'"))
        }
    }
}

fn parse_numeric(args: &str) -> std::result::Result<(u16, Option<u16>), String> {
    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| format!("'{s}' is not a valid numeric parameter"))
    };
    let (precision, scale) = match args.split_once(',') {
        Some((p, s)) => (parse(p)?, Some(parse(s)?)),
        None => (parse(args)?, None),
    };
    if precision == 0 {
        return Err("numeric precision must be positive".to_string());
    }
    if scale.is_some_and(|s| s > precision) {
        return Err("numeric scale cannot exceed precision".to_string());
    }
    Ok((precision, scale))
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => f.write_str("smallint"),
            Self::Integer => f.write_str("integer"),
            Self::BigInt => f.write_str("bigint"),
            Self::Real => f.write_str("real"),
            Self::DoublePrecision => f.write_str("double precision"),
            Self::Numeric(None) => f.write_str("numeric"),
            Self::Numeric(Some((p, None))) => write!(f, "numeric({p})"),
            Self::Numeric(Some((p, Some(s)))) => write!(f, "numeric({p},{s})"),
            Self::Boolean => f.write_str("boolean"),
            Self::Text => f.write_str("text"),
            Self::Varchar(None) => f.write_str("varchar"),
            Self::Varchar(Some(n)) => write!(f, "varchar({n})"),
            Self::Char(None) => f.write_str("char"),
            Self::Char(Some(n)) => write!(f, "char({n})"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampTz => f.write_str("timestamptz"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::TimeTz => f.write_str("timetz"),
            Self::Interval => f.write_str("interval"),
            Self::Bytea => f.write_str("bytea"),
            Self::Uuid => f.write_str("uuid"),
            Self::Json => f.write_str("json"),
            Self::Jsonb => f.write_str("jsonb"),
            Self::Range(kind) => write!(f, "{}range", kind.prefix()),
            Self::Multirange(kind) => write!(f, "{}multirange", kind.prefix()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(base) => write!(f, "{base}"),
            Self::Array { base, len: None } => write!(f, "{base}[]"),
            Self::Array {
                base,
                len: Some(n),
            } => write!(f, "{base}[{n}]"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        parse_column_type(s)
    }
}

impl TryFrom<String> for ColumnType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        parse_column_type(&value)
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ColumnType {
        parse_column_type(text).unwrap_or_else(|e| panic!("Failed to parse '{text}': {e}"))
    }

    #[test]
    fn test_primitive_spellings() {
        assert_eq!(parse("uuid"), ScalarType::Uuid.into());
        assert_eq!(parse("TEXT"), ScalarType::Text.into());
        assert_eq!(parse("int"), ScalarType::Integer.into());
        assert_eq!(parse("bool"), ScalarType::Boolean.into());
        assert_eq!(parse("jsonb"), ScalarType::Jsonb.into());
        assert_eq!(parse("double   precision"), ScalarType::DoublePrecision.into());
        assert_eq!(
            parse("timestamp with time zone"),
            ScalarType::TimestampTz.into()
        );
    }

    #[test]
    fn test_parameterized_types() {
        assert_eq!(parse("varchar(255)"), ScalarType::Varchar(Some(255)).into());
        assert_eq!(parse("varchar"), ScalarType::Varchar(None).into());
        assert_eq!(
            parse("numeric(10, 2)"),
            ScalarType::Numeric(Some((10, Some(2)))).into()
        );
        assert_eq!(
            parse("decimal(8)"),
            ScalarType::Numeric(Some((8, None))).into()
        );
    }

    #[test]
    fn test_ranges() {
        assert_eq!(parse("tstzrange"), ScalarType::Range(RangeKind::TsTz).into());
        assert_eq!(
            parse("int8multirange"),
            ScalarType::Multirange(RangeKind::Int8).into()
        );
    }

    #[test]
    fn test_arrays() {
        assert_eq!(
            parse("text[]"),
            ColumnType::Array {
                base: ScalarType::Text,
                len: None
            }
        );
        assert_eq!(
            parse("varchar(20)[4]"),
            ColumnType::Array {
                base: ScalarType::Varchar(Some(20)),
                len: Some(4)
            }
        );
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "strnig",
            "varchar(abc)",
            "varchar(0)",
            "numeric(2,5)",
            "numeric(10,",
            "uuid(4)",
            "text[][]",
            "text[",
            "int[x]",
        ] {
            assert!(
                matches!(parse_column_type(bad), Err(SchemaError::InvalidType { .. })),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_canonical_display_reparses() {
        for text in [
            "numeric(10,2)",
            "varchar(3)[]",
            "int4range",
            "timestamptz",
            "bigint[2]",
        ] {
            let ty = parse(text);
            assert_eq!(ty.to_string(), text);
            assert_eq!(parse(&ty.to_string()), ty);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let ty: ColumnType = serde_json::from_str("\"character varying(12)\"").unwrap();
        assert_eq!(ty, ScalarType::Varchar(Some(12)).into());
        assert_eq!(serde_json::to_string(&ty).unwrap(), "\"varchar(12)\"");

        let err = serde_json::from_str::<ColumnType>("\"nope\"").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
