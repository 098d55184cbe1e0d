//! Name driven relation calls.
//!
//! Layers above the core (templates, forms, scripted access) address
//! relations by method name: `getPostCollection`, `setPostCollection`,
//! `addPost`, `countPostCollection` on an entity and `getByAuthor`,
//! `countByAuthor`, `deleteByAuthor` on a model. The names are parsed here and
//! mapped onto the explicit [`ReferencedEntity`] and [`Model`] operations;
//! nothing is dispatched dynamically.

use std::rc::Rc;

use crate::collection::SismaCollection;
use crate::entity::{EntityRef, ReferencedEntity};
use crate::error::{Result, SismaError};
use crate::model::Model;
use crate::naming;
use crate::schema::EntitySchema;

const COLLECTION_SUFFIX: &str = "Collection";

// ------------- Entity relations -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationCall {
    /// `get<Name>`
    Get(String),
    /// `set<Name>`
    Set(String),
    /// `add<Member>` appends to `<member>Collection`
    Add(String),
    /// `count<Name>`
    Count(String),
}

impl RelationCall {
    /// Parses `method` against the collections declared on `schema`.
    pub fn parse(method: &str, schema: &EntitySchema) -> Result<Self> {
        let (prefix, rest) = ["get", "set", "add", "count"]
            .iter()
            .find_map(|prefix| method.strip_prefix(prefix).map(|rest| (*prefix, rest)))
            .filter(|(_, rest)| !rest.is_empty())
            .ok_or_else(|| unknown_method(method, schema.name()))?;
        let mut collection = naming::lcfirst(rest);
        if prefix == "add" {
            collection.push_str(COLLECTION_SUFFIX);
        }
        if schema.collection_data(&collection).is_none() {
            return Err(unknown_method(method, schema.name()));
        }
        Ok(match prefix {
            "get" => RelationCall::Get(collection),
            "set" => RelationCall::Set(collection),
            "add" => RelationCall::Add(collection),
            _ => RelationCall::Count(collection),
        })
    }
    pub fn collection(&self) -> &str {
        match self {
            RelationCall::Get(name)
            | RelationCall::Set(name)
            | RelationCall::Add(name)
            | RelationCall::Count(name) => name,
        }
    }
}

pub enum RelationArgument {
    None,
    Entity(EntityRef),
    Collection(SismaCollection),
}

#[derive(Debug)]
pub enum RelationResult {
    None,
    Collection(SismaCollection),
    Count(usize),
}

/// Resolves `method` on `entity` and runs it. `setX` without an argument
/// reloads the collection from the store.
pub fn call(entity: &EntityRef, method: &str, argument: RelationArgument) -> Result<RelationResult> {
    let parsed = {
        let schema = Rc::clone(entity.borrow().schema());
        RelationCall::parse(method, &schema)?
    };
    match (parsed, argument) {
        (RelationCall::Get(name), RelationArgument::None) => {
            Ok(RelationResult::Collection(entity.collection(&name)?))
        }
        (RelationCall::Set(name), RelationArgument::Collection(collection)) => {
            entity.set_collection(&name, Some(collection))?;
            Ok(RelationResult::None)
        }
        (RelationCall::Set(name), RelationArgument::None) => {
            entity.set_collection(&name, None)?;
            Ok(RelationResult::None)
        }
        (RelationCall::Add(name), RelationArgument::Entity(member)) => {
            entity.add_to_collection(&name, &member)?;
            Ok(RelationResult::None)
        }
        (RelationCall::Count(name), RelationArgument::None) => {
            Ok(RelationResult::Count(entity.count_collection(&name)?))
        }
        _ => Err(SismaError::InvalidArgument(format!(
            "wrong argument for {}",
            method
        ))),
    }
}

// ------------- Model relations -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCall {
    GetBy(String),
    CountBy(String),
    DeleteBy(String),
}

impl ModelCall {
    /// `getBy<Short>` and friends, where `<Short>` names an entity valued
    /// property of `schema`.
    pub fn parse(method: &str, schema: &EntitySchema) -> Result<Self> {
        let (prefix, rest) = ["getBy", "countBy", "deleteBy"]
            .iter()
            .find_map(|prefix| method.strip_prefix(prefix).map(|rest| (*prefix, rest)))
            .ok_or_else(|| unknown_method(method, schema.name()))?;
        let property = naming::lcfirst(rest);
        let references = schema
            .field(&property)
            .is_some_and(|field| field.kind().referenced_type().is_some());
        if !references {
            return Err(unknown_method(method, schema.name()));
        }
        Ok(match prefix {
            "getBy" => ModelCall::GetBy(property),
            "countBy" => ModelCall::CountBy(property),
            _ => ModelCall::DeleteBy(property),
        })
    }
    pub fn property(&self) -> &str {
        match self {
            ModelCall::GetBy(property)
            | ModelCall::CountBy(property)
            | ModelCall::DeleteBy(property) => property,
        }
    }
}

#[derive(Debug)]
pub enum ModelResult {
    Collection(SismaCollection),
    Count(i64),
    Deleted(bool),
}

pub fn call_model(model: &Model, method: &str, related: Option<&EntityRef>) -> Result<ModelResult> {
    match ModelCall::parse(method, model.schema())? {
        ModelCall::GetBy(property) => Ok(ModelResult::Collection(model.get_by(&property, related)?)),
        ModelCall::CountBy(property) => Ok(ModelResult::Count(model.count_by(&property, related)?)),
        ModelCall::DeleteBy(property) => {
            Ok(ModelResult::Deleted(model.delete_by(&property, related)?))
        }
    }
}

fn unknown_method(method: &str, entity_type: &str) -> SismaError {
    SismaError::InvalidArgument(format!(
        "{} has no relation method '{}'",
        entity_type, method
    ))
}
