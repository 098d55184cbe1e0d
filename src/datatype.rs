// used for persistence
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};

// used for dates in the database
use chrono::{NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a decimal
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;

use crate::entity::{EntityRef, Reference};
use crate::error::{Result, SismaError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ------------- DataType -------------
/// Logical classification of a bound value, used to pick the driver parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Null,
    Integer,
    String,
    Binary,
    Decimal,
    Date,
    Statement,
    Entity,
    Enumeration,
    Generic,
}

/// Native parameter kinds of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Null,
    Int,
    Str,
    Lob,
    Stmt,
    Untyped,
}

impl DataType {
    /// Inspects a runtime value and returns the concrete tag it binds as.
    pub fn infer(value: &Value) -> DataType {
        match value {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Decimal(_) => DataType::Decimal,
            Value::Text(text) => {
                if looks_binary(text) {
                    DataType::Binary
                } else {
                    DataType::String
                }
            }
            Value::Binary(_) => DataType::Binary,
            Value::Date(_) | Value::DateTime(_) => DataType::Date,
            Value::Enumeration(_) => DataType::Enumeration,
            Value::Entity(_) => DataType::Entity,
        }
    }
    /// `Generic` is replaced by the inferred tag, anything else is kept.
    pub fn resolve(self, value: &Value) -> DataType {
        match self {
            DataType::Generic => DataType::infer(value),
            concrete => concrete,
        }
    }
    pub fn param_kind(self) -> ParamKind {
        match self {
            DataType::Boolean => ParamKind::Bool,
            DataType::Null => ParamKind::Null,
            DataType::Integer | DataType::Entity => ParamKind::Int,
            DataType::Enumeration | DataType::String | DataType::Decimal | DataType::Date => {
                ParamKind::Str
            }
            DataType::Binary => ParamKind::Lob,
            DataType::Statement => ParamKind::Stmt,
            DataType::Generic => ParamKind::Untyped,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "boolean",
            DataType::Null => "null",
            DataType::Integer => "integer",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Decimal => "decimal",
            DataType::Date => "date",
            DataType::Statement => "statement",
            DataType::Entity => "entity",
            DataType::Enumeration => "enumeration",
            DataType::Generic => "generic",
        };
        write!(f, "{}", name)
    }
}

/// Best effort: text carrying NUL or non-whitespace control characters is
/// treated as binary.
pub fn looks_binary(text: &str) -> bool {
    text.chars()
        .any(|c| c == '\0' || (c.is_control() && !matches!(c, '\t' | '\n' | '\r')))
}

// ------------- Enumeration -------------
/// One case of a backed enumeration, persisted as its backing value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumCase {
    enumeration: String,
    name: String,
    value: String,
}

impl EnumCase {
    pub fn new(enumeration: &str, name: &str, value: &str) -> Self {
        Self {
            enumeration: enumeration.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }
    pub fn enumeration(&self) -> &str {
        &self.enumeration
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value(&self) -> &str {
        &self.value
    }
}

// ------------- Value -------------
/// A property value as entities carry it.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(BigDecimal),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Enumeration(EnumCase),
    Entity(Reference),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Enumeration(_) => "enumeration",
            Value::Entity(_) => "entity",
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i64),
            Value::Entity(reference) => reference.id(),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Enumeration(case) => Some(case.value()),
            _ => None,
        }
    }
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Entity(reference) => Some(reference),
            _ => None,
        }
    }
    /// Textual form used for string binding and encryption. `None` for null,
    /// for binary data that is not UTF-8 and for unsaved entities.
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Text(text) => Some(text.clone()),
            Value::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(d) => Some(d.format(DATETIME_FORMAT).to_string()),
            Value::Enumeration(case) => Some(case.value().to_string()),
            Value::Entity(reference) => reference.id().map(|id| id.to_string()),
        }
    }
    /// Converts the value into what the driver receives for a parameter of `kind`.
    pub fn to_sql_value(&self, kind: ParamKind) -> Result<SqlValue> {
        if self.is_null() {
            return Ok(SqlValue::Null);
        }
        let mismatch = || {
            SismaError::InvalidArgument(format!(
                "cannot bind a {} value as {:?}",
                self.kind(),
                kind
            ))
        };
        match kind {
            ParamKind::Null => Ok(SqlValue::Null),
            ParamKind::Bool => match self {
                Value::Boolean(b) => Ok(SqlValue::Integer(*b as i64)),
                Value::Integer(i) => Ok(SqlValue::Integer((*i != 0) as i64)),
                _ => Err(mismatch()),
            },
            ParamKind::Int => match self {
                Value::Text(text) => text
                    .trim()
                    .parse::<i64>()
                    .map(SqlValue::Integer)
                    .map_err(|_| mismatch()),
                Value::Entity(reference) => reference.id().map(SqlValue::Integer).ok_or_else(|| {
                    SismaError::InvalidArgument(format!(
                        "unsaved {} cannot be bound by its primary key",
                        reference.entity_type()
                    ))
                }),
                other => other.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
            },
            ParamKind::Str => self
                .to_plain_string()
                .map(SqlValue::Text)
                .ok_or_else(mismatch),
            ParamKind::Lob => match self {
                Value::Binary(bytes) => Ok(SqlValue::Blob(bytes.clone())),
                Value::Text(text) => Ok(SqlValue::Blob(text.as_bytes().to_vec())),
                _ => Err(mismatch()),
            },
            ParamKind::Stmt => Err(SismaError::InvalidArgument(String::from(
                "statement parameters are not supported by the SQLite driver",
            ))),
            ParamKind::Untyped => self.natural(),
        }
    }
    fn natural(&self) -> Result<SqlValue> {
        let kind = DataType::infer(self).param_kind();
        match kind {
            ParamKind::Untyped => Ok(SqlValue::Null),
            kind => self.to_sql_value(kind),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Enumeration(a), Value::Enumeration(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.same_target(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Entity(reference) => write!(f, "{}", reference),
            other => write!(f, "{}", other.to_plain_string().unwrap_or_default()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.natural()
            .map(ToSqlOutput::Owned)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    }
}

// ------------- Conversions -------------
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}
/// Floats become decimals; non-finite floats have no decimal form and become null.
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        if !f.is_finite() {
            return Value::Null;
        }
        match BigDecimal::from_str(&f.to_string()) {
            Ok(d) => Value::Decimal(d),
            Err(_) => Value::Null,
        }
    }
}
impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Decimal(d)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::DateTime(d)
    }
}
impl From<EnumCase> for Value {
    fn from(case: EnumCase) -> Self {
        Value::Enumeration(case)
    }
}
impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Value::Entity(reference)
    }
}
impl From<&EntityRef> for Value {
    fn from(entity: &EntityRef) -> Self {
        Value::Entity(Reference::loaded(entity))
    }
}
impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Entity(Reference::loaded(&entity))
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        match option {
            Some(value) => value.into(),
            None => Value::Null,
        }
    }
}
