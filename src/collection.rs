use std::rc::Rc;

use crate::datatype::Value;
use crate::entity::EntityRef;
use crate::error::{Result, SismaError};

/// An ordered sequence of entities of one type, fixed when the collection is
/// created. Every insertion is checked against that type.
#[derive(Debug, Clone)]
pub struct SismaCollection {
    restrictive_type: String,
    elements: Vec<EntityRef>,
}

impl SismaCollection {
    pub fn new(restrictive_type: &str) -> Self {
        Self {
            restrictive_type: restrictive_type.to_string(),
            elements: Vec::new(),
        }
    }
    pub fn restrictive_type(&self) -> &str {
        &self.restrictive_type
    }

    pub fn append(&mut self, entity: EntityRef) -> Result<()> {
        self.check(&entity)?;
        self.elements.push(entity);
        Ok(())
    }

    /// Replaces every element, returning the previous ones. Nothing changes
    /// unless all new elements have the restrictive type.
    pub fn exchange_array(&mut self, entities: Vec<EntityRef>) -> Result<Vec<EntityRef>> {
        for entity in &entities {
            self.check(entity)?;
        }
        Ok(std::mem::replace(&mut self.elements, entities))
    }

    /// Appends every element of `other`, which must share the restrictive type.
    pub fn merge_with(&mut self, other: &SismaCollection) -> Result<&mut Self> {
        if other.restrictive_type != self.restrictive_type {
            return Err(SismaError::InvalidType {
                expected: self.restrictive_type.clone(),
                actual: other.restrictive_type.clone(),
            });
        }
        self.elements.extend(other.elements.iter().cloned());
        Ok(self)
    }

    /// Full scan; when several elements match the last one wins.
    pub fn find_entity_from_property(&self, property: &str, value: &Value) -> Option<EntityRef> {
        let mut found = None;
        for entity in &self.elements {
            let candidate = entity.borrow();
            let matches = if property == candidate.schema().primary_key() {
                candidate.id().is_some() && candidate.id() == value.as_i64()
            } else {
                candidate.value(property).is_some_and(|v| v == value)
            };
            if matches {
                found = Some(Rc::clone(entity));
            }
        }
        found
    }

    pub fn has(&self, entity: &EntityRef) -> bool {
        self.elements.iter().any(|e| Rc::ptr_eq(e, entity))
    }

    /// Keeps `length` elements (or all remaining ones) starting at `offset`.
    pub fn slice(&mut self, offset: usize, length: Option<usize>) -> &mut Self {
        let start = offset.min(self.elements.len());
        let end = match length {
            Some(length) => start.saturating_add(length).min(self.elements.len()),
            None => self.elements.len(),
        };
        self.elements.truncate(end);
        self.elements.drain(..start);
        self
    }

    pub fn is_first(&self, entity: &EntityRef) -> bool {
        self.elements.first().is_some_and(|e| Rc::ptr_eq(e, entity))
    }
    pub fn is_last(&self, entity: &EntityRef) -> bool {
        self.elements.last().is_some_and(|e| Rc::ptr_eq(e, entity))
    }
    pub fn first(&self) -> Option<&EntityRef> {
        self.elements.first()
    }
    pub fn last(&self) -> Option<&EntityRef> {
        self.elements.last()
    }
    pub fn get(&self, index: usize) -> Option<&EntityRef> {
        self.elements.get(index)
    }
    pub fn len(&self) -> usize {
        self.elements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, EntityRef> {
        self.elements.iter()
    }
    pub fn to_vec(&self) -> Vec<EntityRef> {
        self.elements.clone()
    }

    fn check(&self, entity: &EntityRef) -> Result<()> {
        let entity = entity.borrow();
        if entity.entity_type() != self.restrictive_type {
            return Err(SismaError::InvalidType {
                expected: self.restrictive_type.clone(),
                actual: entity.entity_type().to_string(),
            });
        }
        Ok(())
    }
}

impl IntoIterator for SismaCollection {
    type Item = EntityRef;
    type IntoIter = std::vec::IntoIter<EntityRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a> IntoIterator for &'a SismaCollection {
    type Item = &'a EntityRef;
    type IntoIter = std::slice::Iter<'a, EntityRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
