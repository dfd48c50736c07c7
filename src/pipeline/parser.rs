//! Chain description parser using winnow.
//!
//! Parses gst-launch style descriptions into an ordered list of
//! [`StageSpec`]s:
//!
//! ```text
//! appsrc do-timestamp=true ! queue max-size-bytes=83886080 ! vp8dec threads=16 ! appsink drop=true
//! ```
//!
//! # Syntax
//!
//! - Stages are separated by `!`
//! - Properties are specified as `name=value` after the stage name
//! - Values can be quoted strings, booleans, numbers, or bare words
//! - Whitespace is optional around `!` and `=`
//! - A `queue` entry configures the queue feeding the stage after it; a
//!   stage with no `queue` in front of it gets none
//! - `name=...` sets the instance name instead of a property

use crate::error::{Error, Result};
use crate::pipeline::config::{Properties, QueueConfig, StageConfig, StageSpec};
use std::fmt;
use winnow::Parser;
use winnow::ascii::{alpha1, digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, repeat, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// A property value in a chain description.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A string value (quoted or unquoted).
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl PropertyValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    /// Try to get as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            PropertyValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// Renders in description syntax; strings are always quoted so they parse
/// back as strings.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) if s.contains('"') => write!(f, "'{s}'"),
            PropertyValue::String(s) => write!(f, "\"{s}\""),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v:?}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for PropertyValue {
            fn from(v: $t) -> Self {
                PropertyValue::Integer(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i32, i64, u8, u32);

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for PropertyValue {
    fn from(v: usize) -> Self {
        PropertyValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

/// A parsed stage before queue folding.
#[derive(Debug, Clone, PartialEq)]
struct ParsedElement {
    name: String,
    properties: Vec<(String, PropertyValue)>,
}

/// Parse a chain description.
///
/// # Example
///
/// ```rust
/// use visionpipe::pipeline::config::QueuePlacement;
/// use visionpipe::pipeline::parser::parse_pipeline;
///
/// let stages = parse_pipeline("appsrc ! queue max-size-bytes=1024 ! vp8dec threads=4 ! appsink").unwrap();
/// assert_eq!(stages.len(), 3);
/// assert_eq!(stages[1].factory, "vp8dec");
/// assert!(matches!(stages[1].queue, QueuePlacement::Custom(q) if q.max_bytes == 1024));
/// ```
pub fn parse_pipeline(input: &str) -> Result<Vec<StageSpec>> {
    let elements = pipeline
        .parse(input.trim())
        .map_err(|e| Error::Parse(format!("{e}")))?;
    fold_queues(elements)
}

/// Turn `queue` entries into the queue placement of the stage after them.
fn fold_queues(elements: Vec<ParsedElement>) -> Result<Vec<StageSpec>> {
    let mut specs = Vec::with_capacity(elements.len());
    let mut pending: Option<QueueConfig> = None;

    for element in elements {
        let mut properties = Properties::from(element.properties);
        let name = properties.take("name").map(|v| v.as_string());

        if element.name == QueueConfig::FACTORY {
            if pending.is_some() {
                return Err(Error::Parse("two queues in a row".into()));
            }
            pending = Some(QueueConfig::from_properties(&properties)?);
            continue;
        }

        let mut spec = StageSpec::new(element.name).with_properties(properties);
        spec.name = name;
        spec = match pending.take() {
            Some(q) => spec.with_queue(q),
            None => spec.without_queue(),
        };
        specs.push(spec);
    }

    if pending.is_some() {
        return Err(Error::Parse("queue must be followed by a stage".into()));
    }
    Ok(specs)
}

/// Parse a complete description.
fn pipeline(input: &mut &str) -> WResult<Vec<ParsedElement>> {
    let elements = separated(1.., element, link_separator).parse_next(input)?;

    // Ensure we consumed all input
    multispace0.parse_next(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }

    Ok(elements)
}

/// Parse a stage (name + optional properties).
fn element(input: &mut &str) -> WResult<ParsedElement> {
    let _ = multispace0.parse_next(input)?;
    let name: &str = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    let properties: Vec<(String, PropertyValue)> = repeat(0.., property).parse_next(input)?;

    Ok(ParsedElement {
        name: name.to_string(),
        properties,
    })
}

/// Parse the link separator `!`.
fn link_separator(input: &mut &str) -> WResult<()> {
    let _ = multispace0.parse_next(input)?;
    let _ = '!'.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(())
}

/// Parse an identifier (stage name or property name).
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

/// Parse a property (key=value).
fn property(input: &mut &str) -> WResult<(String, PropertyValue)> {
    let _ = multispace0.parse_next(input)?;

    // Not a property unless an identifier is followed by `=`; consume nothing then.
    let checkpoint = *input;

    let key: &str = match identifier.parse_next(input) {
        Ok(k) => k,
        Err(_) => {
            *input = checkpoint;
            return Err(ContextError::new());
        }
    };

    let _ = multispace0.parse_next(input)?;

    if input.starts_with('=') {
        let _ = '='.parse_next(input)?;
    } else {
        *input = checkpoint;
        return Err(ContextError::new());
    }

    let _ = multispace0.parse_next(input)?;
    let value = property_value.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    Ok((key.to_string(), value))
}

/// Parse a property value.
fn property_value(input: &mut &str) -> WResult<PropertyValue> {
    alt((
        quoted_string.map(PropertyValue::String),
        boolean.map(PropertyValue::Bool),
        float.map(PropertyValue::Float),
        integer.map(PropertyValue::Integer),
        bare_string.map(PropertyValue::String),
    ))
    .parse_next(input)
}

/// Parse a quoted string.
fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Parse a boolean. The whole word must match, so `none` stays a string.
fn boolean(input: &mut &str) -> WResult<bool> {
    bare_word
        .verify_map(|s: &str| match s {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        })
        .parse_next(input)
}

/// Parse an integer.
fn integer(input: &mut &str) -> WResult<i64> {
    let negative = opt('-').parse_next(input)?;
    let digits: &str = digit1.parse_next(input)?;

    // A float or a word that merely starts with digits
    if input.starts_with(|c: char| !c.is_whitespace() && c != '!') {
        return Err(ContextError::new());
    }

    let value: i64 = digits.parse().map_err(|_| ContextError::new())?;

    Ok(if negative.is_some() { -value } else { value })
}

/// Parse a float.
fn float(input: &mut &str) -> WResult<f64> {
    let negative = opt('-').parse_next(input)?;
    let int_part: &str = digit1.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let frac_part: &str = digit1.parse_next(input)?;

    let s = format!(
        "{}{}.{}",
        if negative.is_some() { "-" } else { "" },
        int_part,
        frac_part
    );
    s.parse().map_err(|_| ContextError::new())
}

fn bare_word<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '!' && c != '=').parse_next(input)
}

/// Parse a bare (unquoted) string value.
/// Stops at whitespace or `!`.
fn bare_string(input: &mut &str) -> WResult<String> {
    bare_word.map(|s: &str| s.to_string()).parse_next(input)
}
