// used for the raw column values of a row
use rusqlite::types::Value as SqlValue;

// used for dates in the database
use chrono::{NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a decimal
use std::str::FromStr;
use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::datatype::{DATE_FORMAT, DATETIME_FORMAT, Value};
use crate::entity::{Entity, EntityRef, Reference};
use crate::error::{Result, SismaError};
use crate::result_set::Record;
use crate::schema::{EntitySchema, FieldKind, FieldSchema};
use crate::session::Session;

const ISO_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const FRACTIONAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Turns rows of one entity type into entities.
pub struct Hydrator<'s> {
    session: &'s Rc<Session>,
    schema: Rc<EntitySchema>,
}

impl<'s> Hydrator<'s> {
    pub fn new(session: &'s Rc<Session>, schema: Rc<EntitySchema>) -> Self {
        Self { session, schema }
    }

    /// Builds the entity for `record`. When the identity cache already holds
    /// the row's entity, that instance is returned untouched.
    pub fn hydrate(&self, record: &Record) -> Result<EntityRef> {
        let primary_key = self.schema.primary_key_column();
        let id = match record.get(&primary_key) {
            Some(SqlValue::Integer(id)) => *id,
            other => {
                return Err(SismaError::Hydration(format!(
                    "{} row without a usable primary key: {:?}",
                    self.schema.name(),
                    other
                )))
            }
        };
        if let Some(entity) = self.session.cached(self.schema.name(), id) {
            trace!(entity = self.schema.name(), id, "hydration served from identity cache");
            return Ok(entity);
        }

        let iv = self
            .schema
            .initialization_vector()
            .and_then(|property| self.schema.field(property))
            .and_then(|field| match record.get(&field.column()) {
                Some(SqlValue::Text(iv)) => Some(iv.clone()),
                _ => None,
            });

        let mut entity = Entity::new(Rc::clone(&self.schema));
        entity.set_id(Some(id));
        for (column, raw) in record.iter() {
            if column == primary_key {
                continue;
            }
            let Some(field) = self.schema.field_by_column(column) else {
                trace!(entity = self.schema.name(), column, "ignoring unmapped column");
                continue;
            };
            let value = if field.is_encrypted() && !matches!(raw, SqlValue::Null) {
                self.decrypt(field, raw, iv.as_deref())?
            } else {
                convert(field, raw)?
            };
            entity.put(field.name(), value);
        }
        entity.attach(self.session);
        entity.mark_saved();

        let entity = Rc::new(RefCell::new(entity));
        self.session.cache(&entity);
        Ok(entity)
    }

    fn decrypt(&self, field: &FieldSchema, raw: &SqlValue, iv: Option<&str>) -> Result<Value> {
        let failed = |message: &str| SismaError::Decryption {
            property: field.name().to_string(),
            message: message.to_string(),
        };
        let cipher = self
            .session
            .cipher()
            .ok_or_else(|| failed("no encryption key is configured"))?;
        let iv = iv.ok_or_else(|| failed("the initialization vector is missing"))?;
        let SqlValue::Text(ciphertext) = raw else {
            return Err(failed("the stored value is not text"));
        };
        let plaintext = cipher.decrypt(field.name(), ciphertext, iv)?;
        if matches!(field.kind(), FieldKind::Binary) {
            return Ok(Value::Binary(plaintext));
        }
        let text = String::from_utf8(plaintext).map_err(|_| failed("plaintext is not UTF-8"))?;
        convert(field, &SqlValue::Text(text))
    }
}

/// Converts one stored column value to the property's kind.
pub fn convert(field: &FieldSchema, raw: &SqlValue) -> Result<Value> {
    if matches!(raw, SqlValue::Null) {
        return Ok(Value::Null);
    }
    let mismatch = || {
        SismaError::Hydration(format!(
            "cannot read {:?} as {} for '{}'",
            raw,
            field.kind(),
            field.name()
        ))
    };
    let value = match (field.kind(), raw) {
        (FieldKind::Boolean, SqlValue::Integer(i)) => Value::Boolean(*i != 0),
        (FieldKind::Boolean, SqlValue::Text(text)) => match text.trim() {
            "1" | "true" => Value::Boolean(true),
            "0" | "false" | "" => Value::Boolean(false),
            _ => return Err(mismatch()),
        },
        (FieldKind::Integer, SqlValue::Integer(i)) => Value::Integer(*i),
        (FieldKind::Integer, SqlValue::Text(text)) => {
            Value::Integer(text.trim().parse().map_err(|_| mismatch())?)
        }
        (FieldKind::Decimal, SqlValue::Integer(i)) => Value::Decimal(BigDecimal::from(*i)),
        (FieldKind::Decimal, SqlValue::Real(f)) => match Value::from(*f) {
            Value::Null => return Err(mismatch()),
            decimal => decimal,
        },
        (FieldKind::Decimal, SqlValue::Text(text)) => {
            Value::Decimal(BigDecimal::from_str(text.trim()).map_err(|_| mismatch())?)
        }
        (FieldKind::Text, SqlValue::Text(text)) => Value::Text(text.clone()),
        (FieldKind::Text, SqlValue::Integer(i)) => Value::Text(i.to_string()),
        (FieldKind::Text, SqlValue::Real(f)) => Value::Text(f.to_string()),
        (FieldKind::Text, SqlValue::Blob(bytes)) => {
            Value::Text(String::from_utf8(bytes.clone()).map_err(|_| mismatch())?)
        }
        (FieldKind::Binary, SqlValue::Blob(bytes)) => Value::Binary(bytes.clone()),
        (FieldKind::Binary, SqlValue::Text(text)) => Value::Binary(text.as_bytes().to_vec()),
        (FieldKind::Date, SqlValue::Text(text)) => Value::Date(parse_date(text).ok_or_else(mismatch)?),
        (FieldKind::DateTime, SqlValue::Text(text)) => {
            Value::DateTime(parse_datetime(text).ok_or_else(mismatch)?)
        }
        (FieldKind::Enumeration(enumeration), raw) => {
            let stored = match raw {
                SqlValue::Text(text) => text.clone(),
                SqlValue::Integer(i) => i.to_string(),
                _ => return Err(mismatch()),
            };
            let case = enumeration.from_value(&stored).ok_or_else(|| {
                SismaError::Hydration(format!(
                    "'{}' is not a case of {} (property '{}')",
                    stored,
                    enumeration.name(),
                    field.name()
                ))
            })?;
            Value::Enumeration(case)
        }
        (FieldKind::Entity(entity_type), SqlValue::Integer(id)) => {
            Value::Entity(Reference::unloaded(entity_type, *id))
        }
        (FieldKind::Entity(entity_type), SqlValue::Text(text)) => {
            let id = text.trim().parse().map_err(|_| mismatch())?;
            Value::Entity(Reference::unloaded(entity_type, id))
        }
        _ => return Err(mismatch()),
    };
    Ok(value)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(text).map(|d| d.date()))
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, FRACTIONAL_DATETIME_FORMAT))
        .or_else(|_| NaiveDateTime::parse_from_str(text, ISO_DATETIME_FORMAT))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
