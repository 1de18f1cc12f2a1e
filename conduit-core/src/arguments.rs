// Resolved argument values handed to route actions

use crate::error::ArgumentError;
use std::any::Any;
use std::fmt;
use std::str::FromStr;

/// The value resolved for one formal parameter.
pub enum ArgumentValue {
    /// Raw string from a route or query variable.
    Raw(String),
    /// The parameter's declared default.
    Default(String),
    /// A request body decoded into the parameter's declared type.
    Body(Box<dyn Any + Send>),
    /// No value; only produced for nullable parameters.
    Null,
}

impl ArgumentValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ArgumentValue::Null)
    }

    /// The string form of a scalar value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgumentValue::Raw(s) | ArgumentValue::Default(s) => Some(s),
            ArgumentValue::Body(_) | ArgumentValue::Null => None,
        }
    }
}

impl fmt::Debug for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Raw(s) => f.debug_tuple("Raw").field(s).finish(),
            ArgumentValue::Default(s) => f.debug_tuple("Default").field(s).finish(),
            ArgumentValue::Body(_) => f.write_str("Body(..)"),
            ArgumentValue::Null => f.write_str("Null"),
        }
    }
}

/// Arguments for one invocation, in declaration order.
///
/// Scalars are kept as raw strings; actions coerce them with
/// [`Arguments::parse`] into whatever type they declared.
#[derive(Debug, Default)]
pub struct Arguments {
    values: Vec<(String, ArgumentValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: ArgumentValue) {
        self.values.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Names and values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn lookup(&self, name: &str) -> Result<&ArgumentValue, ArgumentError> {
        self.get(name)
            .ok_or_else(|| ArgumentError::Undeclared(name.to_string()))
    }

    /// A scalar argument as a string.
    pub fn string(&self, name: &str) -> Result<String, ArgumentError> {
        self.optional_string(name)?
            .ok_or_else(|| ArgumentError::Null(name.to_string()))
    }

    /// A scalar argument as a string, `None` if it resolved to null.
    pub fn optional_string(&self, name: &str) -> Result<Option<String>, ArgumentError> {
        match self.lookup(name)? {
            ArgumentValue::Null => Ok(None),
            ArgumentValue::Body(_) => Err(ArgumentError::TypeMismatch {
                name: name.to_string(),
                expected: "scalar value",
            }),
            value => Ok(value.as_str().map(str::to_string)),
        }
    }

    /// A scalar argument converted with [`FromStr`].
    pub fn parse<T>(&self, name: &str) -> Result<T, ArgumentError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional_parse(name)?
            .ok_or_else(|| ArgumentError::Null(name.to_string()))
    }

    pub fn optional_parse<T>(&self, name: &str) -> Result<Option<T>, ArgumentError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.optional_string(name)? else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|e| ArgumentError::Conversion {
                name: name.to_string(),
                value: raw.clone(),
                type_name: std::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }

    /// Move a decoded body argument out as `T`.
    ///
    /// The slot is left null afterwards.
    pub fn take_body<T: 'static>(&mut self, name: &str) -> Result<T, ArgumentError> {
        self.take_optional_body(name)?
            .ok_or_else(|| ArgumentError::Null(name.to_string()))
    }

    pub fn take_optional_body<T: 'static>(&mut self, name: &str) -> Result<Option<T>, ArgumentError> {
        let slot = self
            .values
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ArgumentError::Undeclared(name.to_string()))?;

        match std::mem::replace(slot, ArgumentValue::Null) {
            ArgumentValue::Null => Ok(None),
            ArgumentValue::Body(any) => match any.downcast::<T>() {
                Ok(value) => Ok(Some(*value)),
                Err(any) => {
                    *slot = ArgumentValue::Body(any);
                    Err(ArgumentError::TypeMismatch {
                        name: name.to_string(),
                        expected: std::any::type_name::<T>(),
                    })
                }
            },
            scalar => {
                *slot = scalar;
                Err(ArgumentError::TypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<T>(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Payload(u8);

    fn sample() -> Arguments {
        Arguments::new()
            .with("id", ArgumentValue::Raw("42".into()))
            .with("page", ArgumentValue::Default("1".into()))
            .with("filter", ArgumentValue::Null)
            .with("payload", ArgumentValue::Body(Box::new(Payload(7))))
    }

    #[test]
    fn test_scalar_access() {
        let args = sample();
        assert_eq!(args.string("id").unwrap(), "42");
        assert_eq!(args.parse::<u32>("id").unwrap(), 42);
        assert_eq!(args.parse::<u32>("page").unwrap(), 1);
        assert_eq!(args.optional_string("filter").unwrap(), None);
        assert!(matches!(args.string("filter"), Err(ArgumentError::Null(_))));
        assert!(matches!(args.string("nope"), Err(ArgumentError::Undeclared(_))));
    }

    #[test]
    fn test_conversion_error() {
        let args = Arguments::new().with("id", ArgumentValue::Raw("abc".into()));
        match args.parse::<i64>("id") {
            Err(ArgumentError::Conversion { value, type_name, .. }) => {
                assert_eq!(value, "abc");
                assert_eq!(type_name, "i64");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_take_body() {
        let mut args = sample();
        assert!(matches!(
            args.take_body::<String>("payload"),
            Err(ArgumentError::TypeMismatch { .. })
        ));
        assert_eq!(args.take_body::<Payload>("payload").unwrap(), Payload(7));
        assert!(args.get("payload").unwrap().is_null());
        assert_eq!(args.take_optional_body::<Payload>("payload").unwrap(), None);
    }

    #[test]
    fn test_scalar_is_not_a_body() {
        let mut args = sample();
        assert!(args.take_body::<String>("id").is_err());
        assert_eq!(args.string("id").unwrap(), "42");
        assert!(matches!(
            args.string("payload"),
            Err(ArgumentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_declaration_order() {
        let names: Vec<_> = sample().iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["id", "page", "filter", "payload"]);
    }
}
