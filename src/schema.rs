//! Explicit schema descriptors.
//!
//! Every entity type is described once by an [`EntitySchema`]: its table,
//! primary key and an ordered list of [`FieldSchema`]s carrying the semantic
//! type, nullability, default value and the encrypted / searchable flags. The
//! hydrator, the data mapper and the defaulting logic all read the descriptor;
//! nothing is discovered at runtime.
//!
//! Reverse ("has many") collections are registered on the
//! [`SchemaRegistry`], which validates them as soon as they are declared.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::datatype::{DataType, EnumCase, Value};
use crate::error::{Result, SismaError};
use crate::naming;

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const DEFAULT_INITIALIZATION_VECTOR: &str = "initializationVector";
pub const PARENT_PREFIX: &str = "parent";
pub const SON_COLLECTION: &str = "sonCollection";

// ------------- Enumeration -------------
#[derive(Debug, PartialEq, Eq)]
pub struct EnumSchema {
    name: String,
    cases: Vec<EnumCase>,
}

impl EnumSchema {
    /// `cases` are `(case name, backing value)` pairs.
    pub fn new(name: &str, cases: &[(&str, &str)]) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            cases: cases
                .iter()
                .map(|(case, value)| EnumCase::new(name, case, value))
                .collect(),
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn cases(&self) -> &[EnumCase] {
        &self.cases
    }
    pub fn case(&self, name: &str) -> Option<EnumCase> {
        self.cases.iter().find(|c| c.name() == name).cloned()
    }
    pub fn from_value(&self, value: &str) -> Option<EnumCase> {
        self.cases.iter().find(|c| c.value() == value).cloned()
    }
}

// ------------- Field -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Integer,
    Decimal,
    Text,
    Binary,
    Date,
    DateTime,
    Enumeration(Rc<EnumSchema>),
    Entity(String),
}

impl FieldKind {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldKind::Boolean => DataType::Boolean,
            FieldKind::Integer => DataType::Integer,
            FieldKind::Decimal => DataType::Decimal,
            FieldKind::Text => DataType::String,
            FieldKind::Binary => DataType::Binary,
            FieldKind::Date | FieldKind::DateTime => DataType::Date,
            FieldKind::Enumeration(_) => DataType::Enumeration,
            FieldKind::Entity(_) => DataType::Entity,
        }
    }
    /// Whether a non-null value may be stored in a field of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Boolean, Value::Boolean(_)) => true,
            (FieldKind::Integer, Value::Integer(_)) => true,
            (FieldKind::Decimal, Value::Decimal(_) | Value::Integer(_)) => true,
            (FieldKind::Text, Value::Text(_)) => true,
            (FieldKind::Binary, Value::Binary(_) | Value::Text(_)) => true,
            (FieldKind::Date, Value::Date(_)) => true,
            (FieldKind::DateTime, Value::DateTime(_)) => true,
            (FieldKind::Enumeration(e), Value::Enumeration(case)) => {
                case.enumeration() == e.name()
            }
            (FieldKind::Entity(entity_type), Value::Entity(reference)) => {
                reference.entity_type() == entity_type
            }
            _ => false,
        }
    }
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            FieldKind::Entity(entity_type) => Some(entity_type),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Decimal => write!(f, "decimal"),
            FieldKind::Text => write!(f, "text"),
            FieldKind::Binary => write!(f, "binary"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::DateTime => write!(f, "datetime"),
            FieldKind::Enumeration(e) => write!(f, "{}", e.name()),
            FieldKind::Entity(entity_type) => write!(f, "{}", entity_type),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    name: String,
    kind: FieldKind,
    nullable: bool,
    default: Option<Value>,
    encrypted: bool,
    searchable: bool,
}

impl FieldSchema {
    /// A required, plain field.
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
            default: None,
            encrypted: false,
            searchable: false,
        }
    }
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn column(&self) -> String {
        naming::snake_case(&self.name)
    }
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }
    pub fn is_searchable(&self) -> bool {
        self.searchable
    }
}

// ------------- Collection metadata -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionData {
    name: String,
    referencing_type: String,
    referencing_property: String,
}

impl CollectionData {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn referencing_type(&self) -> &str {
        &self.referencing_type
    }
    pub fn referencing_property(&self) -> &str {
        &self.referencing_property
    }
}

/// Keys of [`SchemaRegistry::collection_data_information`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionInfo {
    ForeignKeyType,
    ForeignKeyName,
}

// ------------- Entity schema -------------
#[derive(Debug)]
pub struct EntitySchema {
    name: String,
    table: String,
    primary_key: String,
    fields: Vec<FieldSchema>,
    initialization_vector: Option<String>,
    parent_property: Option<String>,
    // filled by the registry after the schema is shared
    collections: RefCell<BTreeMap<String, CollectionData>>,
}

impl EntitySchema {
    pub fn builder(name: &str) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            name: name.to_string(),
            table: None,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields: Vec::new(),
            initialization_vector: None,
            self_referenced: false,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn short_name(&self) -> &str {
        naming::short_name(&self.name)
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }
    pub fn primary_key_column(&self) -> String {
        naming::snake_case(&self.primary_key)
    }
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
    pub fn field_by_column(&self, column: &str) -> Option<&FieldSchema> {
        self.field(&naming::camel_case(column))
    }
    pub fn has_encrypted_fields(&self) -> bool {
        self.fields.iter().any(|f| f.encrypted)
    }
    pub fn initialization_vector(&self) -> Option<&str> {
        self.initialization_vector.as_deref()
    }
    pub fn parent_property(&self) -> Option<&str> {
        self.parent_property.as_deref()
    }
    pub fn is_self_referenced(&self) -> bool {
        self.parent_property.is_some()
    }
    pub fn collection_data(&self, name: &str) -> Option<CollectionData> {
        self.collections.borrow().get(name).cloned()
    }
}

pub struct EntitySchemaBuilder {
    name: String,
    table: Option<String>,
    primary_key: String,
    fields: Vec<FieldSchema>,
    initialization_vector: Option<String>,
    self_referenced: bool,
}

impl EntitySchemaBuilder {
    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }
    pub fn primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }
    /// Property holding the initialization vector shared by all encrypted
    /// properties of an entity. Defaults to `initializationVector`.
    pub fn initialization_vector(mut self, property: &str) -> Self {
        self.initialization_vector = Some(property.to_string());
        self
    }
    /// Adds a nullable `parent<ShortName>` reference to the same type and, once
    /// registered, a `sonCollection` of children.
    pub fn self_referenced(mut self) -> Self {
        self.self_referenced = true;
        self
    }
    pub fn build(mut self) -> Result<EntitySchema> {
        let invalid = |message: String| Err(SismaError::InvalidArgument(message));
        let mut seen = vec![self.primary_key.as_str()];
        for field in &self.fields {
            if seen.contains(&field.name.as_str()) {
                return invalid(format!("{} declares '{}' twice", self.name, field.name));
            }
            seen.push(&field.name);
            if field.encrypted && field.kind.referenced_type().is_some() {
                return invalid(format!(
                    "{}.{} references an entity and cannot be encrypted",
                    self.name, field.name
                ));
            }
            if let Some(default) = &field.default {
                if !default.is_null() && !field.kind.accepts(default) {
                    return invalid(format!(
                        "default of {}.{} is not a {} value",
                        self.name, field.name, field.kind
                    ));
                }
            }
        }
        let initialization_vector = if self.fields.iter().any(|f| f.encrypted) {
            let property = self
                .initialization_vector
                .take()
                .unwrap_or_else(|| DEFAULT_INITIALIZATION_VECTOR.to_string());
            if self.fields.iter().all(|f| f.name != property) {
                self.fields
                    .push(FieldSchema::new(&property, FieldKind::Text).nullable());
            }
            Some(property)
        } else {
            None
        };
        let parent_property = if self.self_referenced {
            let property = format!("{}{}", PARENT_PREFIX, naming::short_name(&self.name));
            if self.fields.iter().all(|f| f.name != property) {
                self.fields.push(
                    FieldSchema::new(&property, FieldKind::Entity(self.name.clone())).nullable(),
                );
            }
            Some(property)
        } else {
            None
        };
        let table = self
            .table
            .unwrap_or_else(|| naming::table_name(&self.name));
        Ok(EntitySchema {
            name: self.name,
            table,
            primary_key: self.primary_key,
            fields: self.fields,
            initialization_vector,
            parent_property,
            collections: RefCell::new(BTreeMap::new()),
        })
    }
}

// ------------- Registry -------------
/// All entity types known to a session, by fully qualified type name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Rc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&mut self, schema: EntitySchema) -> Result<Rc<EntitySchema>> {
        if self.schemas.contains_key(schema.name()) {
            return Err(SismaError::InvalidArgument(format!(
                "{} is already registered",
                schema.name()
            )));
        }
        let schema = Rc::new(schema);
        self.schemas
            .insert(schema.name().to_string(), Rc::clone(&schema));
        debug!(entity = schema.name(), table = schema.table(), "registered schema");
        if let Some(parent) = schema.parent_property() {
            self.add_collection_data(schema.name(), SON_COLLECTION, schema.name(), parent)?;
        }
        Ok(schema)
    }
    /// Declares that `owner` has a collection `name` of `referencing_type`
    /// entities pointing back at it through `referencing_property`. The
    /// declaration is checked right away.
    pub fn add_collection_data(
        &mut self,
        owner: &str,
        name: &str,
        referencing_type: &str,
        referencing_property: &str,
    ) -> Result<()> {
        let owner_schema = self.schema(owner)?;
        let referencing = self.schema(referencing_type)?;
        let field = referencing.field(referencing_property).ok_or_else(|| {
            SismaError::InvalidArgument(format!(
                "{} has no property '{}'",
                referencing_type, referencing_property
            ))
        })?;
        if field.kind().referenced_type() != Some(owner) {
            return Err(SismaError::InvalidArgument(format!(
                "{}.{} is a {} and cannot reference {}",
                referencing_type,
                referencing_property,
                field.kind(),
                owner
            )));
        }
        let mut collections = owner_schema.collections.borrow_mut();
        if collections.contains_key(name) {
            return Err(SismaError::InvalidArgument(format!(
                "{} already declares the collection '{}'",
                owner, name
            )));
        }
        collections.insert(
            name.to_string(),
            CollectionData {
                name: name.to_string(),
                referencing_type: referencing_type.to_string(),
                referencing_property: referencing_property.to_string(),
            },
        );
        Ok(())
    }
    pub fn get(&self, name: &str) -> Option<&Rc<EntitySchema>> {
        self.schemas.get(name)
    }
    pub fn schema(&self, name: &str) -> Result<Rc<EntitySchema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| SismaError::InvalidArgument(format!("{} is not registered", name)))
    }
    /// Stable lookup for layers above the core (forms, validation).
    pub fn collection_data_information(
        &self,
        owner: &str,
        collection: &str,
        info: CollectionInfo,
    ) -> Result<String> {
        let data = self.schema(owner)?.collection_data(collection).ok_or_else(|| {
            SismaError::InvalidArgument(format!(
                "{} declares no collection '{}'",
                owner, collection
            ))
        })?;
        Ok(match info {
            CollectionInfo::ForeignKeyType => data.referencing_type,
            CollectionInfo::ForeignKeyName => data.referencing_property,
        })
    }
    pub fn model_name(&self, entity_type: &str) -> Result<String> {
        self.schema(entity_type)
            .map(|schema| naming::model_name(schema.name()))
    }
    pub fn len(&self) -> usize {
        self.schemas.len()
    }
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
