use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::collection::SismaCollection;
use crate::datatype::Value;
use crate::error::{Result, SismaError};
use crate::schema::{CollectionData, EntitySchema};
use crate::session::Session;

/// Entities are shared and mutated in place; identity is pointer identity.
pub type EntityRef = Rc<RefCell<Entity>>;

// ------------- Reference -------------
#[derive(Clone)]
enum Link {
    // only the primary key is known, the entity is loaded on first access
    Unloaded(i64),
    Loaded(EntityRef),
    // back-reference from a collection member to the entity owning the collection
    Owner(Weak<RefCell<Entity>>, Option<i64>),
}

/// The value of a property typed as another entity.
#[derive(Clone)]
pub struct Reference {
    entity_type: String,
    link: Link,
}

impl Reference {
    pub fn unloaded(entity_type: &str, id: i64) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            link: Link::Unloaded(id),
        }
    }
    pub fn loaded(entity: &EntityRef) -> Self {
        Self {
            entity_type: entity.borrow().entity_type().to_string(),
            link: Link::Loaded(Rc::clone(entity)),
        }
    }
    /// A weak back-reference, so that owner and collection member do not keep
    /// each other alive.
    pub fn owner(entity: &EntityRef) -> Self {
        let owner = entity.borrow();
        Self {
            entity_type: owner.entity_type().to_string(),
            link: Link::Owner(Rc::downgrade(entity), owner.id()),
        }
    }
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
    pub fn id(&self) -> Option<i64> {
        match &self.link {
            Link::Unloaded(id) => Some(*id),
            Link::Loaded(entity) => entity.try_borrow().ok().and_then(|e| e.id()),
            Link::Owner(owner, id) => owner
                .upgrade()
                .and_then(|o| o.try_borrow().ok().and_then(|e| e.id()))
                .or(*id),
        }
    }
    pub fn is_loaded(&self) -> bool {
        self.entity().is_some()
    }
    /// The referenced entity when it is in memory.
    pub fn entity(&self) -> Option<EntityRef> {
        match &self.link {
            Link::Unloaded(_) => None,
            Link::Loaded(entity) => Some(Rc::clone(entity)),
            Link::Owner(owner, _) => owner.upgrade(),
        }
    }
    /// Both sides point at the same entity: the same instance when both are in
    /// memory, otherwise the same type and persisted identifier.
    pub fn same_target(&self, other: &Reference) -> bool {
        match (self.entity(), other.entity()) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            _ => {
                self.entity_type == other.entity_type
                    && self.id().is_some()
                    && self.id() == other.id()
            }
        }
    }
    /// Returns the entity, loading it through the session when only the
    /// identifier is known.
    pub fn resolve(&self, session: Option<&Rc<Session>>) -> Result<EntityRef> {
        if let Some(entity) = self.entity() {
            return Ok(entity);
        }
        let id = self.id().ok_or_else(|| {
            SismaError::Detached(format!("reference to an unsaved {}", self.entity_type))
        })?;
        let session = session.ok_or_else(|| {
            SismaError::Detached(format!("cannot load {} #{}", self.entity_type, id))
        })?;
        session
            .find_entity(&self.entity_type, id)?
            .ok_or_else(|| SismaError::NotFound {
                entity: self.entity_type.clone(),
                id,
            })
    }
    fn with_entity(&self, entity: EntityRef) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            link: Link::Loaded(entity),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}#{}", self.entity_type, id),
            None => write!(f, "{}#new", self.entity_type),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match &self.link {
            Link::Unloaded(_) => "unloaded",
            Link::Loaded(_) => "loaded",
            Link::Owner(..) => "owner",
        };
        write!(f, "Reference({}, {})", self, state)
    }
}

// ------------- Entity -------------
/// Persisted state of an entity, taken before a write inside a transaction.
#[derive(Debug, Clone)]
pub(crate) struct EntityState {
    id: Option<i64>,
    values: BTreeMap<String, Value>,
    modified: bool,
}

/// A property bag shaped by an [`EntitySchema`], mirroring one row.
pub struct Entity {
    schema: Rc<EntitySchema>,
    session: Option<Weak<Session>>,
    id: Option<i64>,
    values: BTreeMap<String, Value>,
    collections: BTreeMap<String, SismaCollection>,
    modified: bool,
}

impl Entity {
    /// A fresh, unsaved entity with the schema's default values applied.
    pub fn new(schema: Rc<EntitySchema>) -> Self {
        let mut values = BTreeMap::new();
        for field in schema.fields() {
            if let Some(default) = field.default_value() {
                values.insert(field.name().to_string(), default.clone());
            }
        }
        Self {
            schema,
            session: None,
            id: None,
            values,
            collections: BTreeMap::new(),
            modified: false,
        }
    }
    pub fn create(schema: Rc<EntitySchema>) -> EntityRef {
        Rc::new(RefCell::new(Self::new(schema)))
    }
    pub fn schema(&self) -> &Rc<EntitySchema> {
        &self.schema
    }
    pub fn entity_type(&self) -> &str {
        self.schema.name()
    }
    pub fn id(&self) -> Option<i64> {
        self.id
    }
    pub fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }
    pub fn is_modified(&self) -> bool {
        self.modified
    }
    pub(crate) fn mark_saved(&mut self) {
        self.modified = false;
    }
    pub fn attach(&mut self, session: &Rc<Session>) {
        self.session = Some(Rc::downgrade(session));
    }
    pub fn session(&self) -> Option<Rc<Session>> {
        self.session.as_ref().and_then(Weak::upgrade)
    }

    /// Raw stored value, references are not resolved.
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads a property. Entity typed properties are loaded on first access and
    /// kept for later reads.
    pub fn get(&mut self, property: &str) -> Result<Value> {
        if property == self.schema.primary_key() {
            return Ok(Value::from(self.id));
        }
        let field = self.schema.field(property).ok_or_else(|| self.unknown(property))?;
        let value = match self.values.get(property) {
            Some(value) if !value.is_null() => value.clone(),
            _ if field.is_nullable() => return Ok(Value::Null),
            _ => {
                return Err(SismaError::UnassignedProperty {
                    entity: self.entity_type().to_string(),
                    property: property.to_string(),
                })
            }
        };
        let pending = match &value {
            Value::Entity(reference) if !reference.is_loaded() => Some(reference.clone()),
            _ => None,
        };
        let Some(reference) = pending else {
            return Ok(value);
        };
        trace!(entity = self.entity_type(), property, "lazy loading reference");
        let session = self.session();
        let entity = reference.resolve(session.as_ref())?;
        let loaded = if std::ptr::eq(entity.as_ptr() as *const Entity, self as *const Entity) {
            // an entity referencing itself must not hold itself strongly
            Reference {
                entity_type: reference.entity_type.clone(),
                link: Link::Owner(Rc::downgrade(&entity), self.id),
            }
        } else {
            reference.with_entity(entity)
        };
        self.values
            .insert(property.to_string(), Value::Entity(loaded.clone()));
        Ok(Value::Entity(loaded))
    }

    /// Writes a property after checking it against the schema.
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if property == self.schema.primary_key() {
            self.id = match value {
                Value::Integer(id) => Some(id),
                Value::Null => None,
                other => {
                    return Err(SismaError::InvalidType {
                        expected: String::from("integer"),
                        actual: describe(&other),
                    })
                }
            };
            self.modified = true;
            return Ok(());
        }
        let field = self.schema.field(property).ok_or_else(|| self.unknown(property))?;
        if value.is_null() {
            if !field.is_nullable() {
                return Err(SismaError::InvalidArgument(format!(
                    "{}.{} is not nullable",
                    self.entity_type(),
                    property
                )));
            }
        } else if !field.kind().accepts(&value) {
            return Err(SismaError::InvalidType {
                expected: field.kind().to_string(),
                actual: describe(&value),
            });
        }
        self.values.insert(property.to_string(), value);
        self.modified = true;
        Ok(())
    }

    /// The entity a reference property points at, loading it if needed.
    pub fn related(&mut self, property: &str) -> Result<Option<EntityRef>> {
        match self.get(property)? {
            Value::Entity(reference) => Ok(reference.entity()),
            _ => Ok(None),
        }
    }

    /// Fails on the first non-nullable property that holds no value.
    pub fn check_assigned(&self) -> Result<()> {
        for field in self.schema.fields() {
            let assigned = self
                .values
                .get(field.name())
                .is_some_and(|value| !value.is_null());
            if !assigned && !field.is_nullable() {
                return Err(SismaError::UnassignedProperty {
                    entity: self.entity_type().to_string(),
                    property: field.name().to_string(),
                });
            }
        }
        Ok(())
    }

    // hydration and persistence write values without schema checks or dirtying
    pub(crate) fn put(&mut self, property: &str, value: Value) {
        self.values.insert(property.to_string(), value);
    }
    pub(crate) fn point_to(&mut self, property: &str, reference: Reference) {
        let previous = self
            .values
            .get(property)
            .and_then(Value::as_reference)
            .and_then(Reference::id);
        if previous.is_none() || previous != reference.id() {
            self.modified = true;
        }
        self.values
            .insert(property.to_string(), Value::Entity(reference));
    }

    pub(crate) fn snapshot(&self) -> EntityState {
        EntityState {
            id: self.id,
            values: self.values.clone(),
            modified: self.modified,
        }
    }
    pub(crate) fn restore(&mut self, state: EntityState) {
        self.id = state.id;
        self.values = state.values;
        self.modified = state.modified;
    }

    pub(crate) fn collection_slot(&self, name: &str) -> Option<&SismaCollection> {
        self.collections.get(name)
    }
    pub(crate) fn store_collection(&mut self, name: &str, collection: SismaCollection) {
        self.collections.insert(name.to_string(), collection);
    }
    /// Collections already held in memory, keyed by collection name.
    pub fn loaded_collections(&self) -> impl Iterator<Item = (&str, &SismaCollection)> {
        self.collections.iter().map(|(k, c)| (k.as_str(), c))
    }

    fn unknown(&self, property: &str) -> SismaError {
        SismaError::InvalidArgument(format!(
            "{} has no property '{}'",
            self.entity_type(),
            property
        ))
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Entity(reference) => reference.entity_type().to_string(),
        Value::Enumeration(case) => case.enumeration().to_string(),
        other => other.kind().to_string(),
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.entity_type())
            .field("id", &self.id)
            .field("values", &self.values)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ------------- Referenced entity -------------
/// Reverse ("has many") collections declared through
/// [`crate::schema::SchemaRegistry::add_collection_data`].
pub trait ReferencedEntity {
    /// The named collection, loaded from the store on first access.
    fn collection(&self, name: &str) -> Result<SismaCollection>;
    /// Replaces the named collection and points every member back at this
    /// entity. `None` loads the collection from the store.
    fn set_collection(&self, name: &str, collection: Option<SismaCollection>) -> Result<()>;
    /// Appends one entity and points it back at this entity.
    fn add_to_collection(&self, name: &str, entity: &EntityRef) -> Result<()>;
    fn count_collection(&self, name: &str) -> Result<usize>;
}

impl ReferencedEntity for EntityRef {
    fn collection(&self, name: &str) -> Result<SismaCollection> {
        let kept = self.borrow().collection_slot(name).cloned();
        if let Some(collection) = kept {
            return Ok(collection);
        }
        self.set_collection(name, None)?;
        let entity = self.borrow();
        entity
            .collection_slot(name)
            .cloned()
            .ok_or_else(|| unknown_collection(&entity, name))
    }

    fn set_collection(&self, name: &str, collection: Option<SismaCollection>) -> Result<()> {
        let data = collection_data(self, name)?;
        let collection = match collection {
            Some(collection) => collection,
            None => load_collection(self, &data)?,
        };
        if collection.restrictive_type() != data.referencing_type() {
            return Err(SismaError::InvalidType {
                expected: data.referencing_type().to_string(),
                actual: collection.restrictive_type().to_string(),
            });
        }
        let back_reference = Reference::owner(self);
        for member in collection.iter() {
            member
                .borrow_mut()
                .point_to(data.referencing_property(), back_reference.clone());
        }
        self.borrow_mut().store_collection(name, collection);
        Ok(())
    }

    fn add_to_collection(&self, name: &str, entity: &EntityRef) -> Result<()> {
        let data = collection_data(self, name)?;
        let mut collection = self.collection(name)?;
        collection.append(Rc::clone(entity))?;
        let back_reference = Reference::owner(self);
        entity
            .borrow_mut()
            .point_to(data.referencing_property(), back_reference);
        self.borrow_mut().store_collection(name, collection);
        Ok(())
    }

    fn count_collection(&self, name: &str) -> Result<usize> {
        let data = collection_data(self, name)?;
        let (kept, id, session) = {
            let entity = self.borrow();
            (
                entity.collection_slot(name).map(SismaCollection::len),
                entity.id(),
                entity.session(),
            )
        };
        match (kept, id) {
            (Some(len), _) => Ok(len),
            (None, None) => Ok(0),
            (None, Some(_)) => {
                let session = session.ok_or_else(|| detached(self))?;
                let count = session
                    .model(data.referencing_type())?
                    .count_by(data.referencing_property(), Some(self))?;
                Ok(count.max(0) as usize)
            }
        }
    }
}

fn collection_data(entity: &EntityRef, name: &str) -> Result<CollectionData> {
    let entity = entity.borrow();
    entity
        .schema()
        .collection_data(name)
        .ok_or_else(|| unknown_collection(&entity, name))
}

fn load_collection(owner: &EntityRef, data: &CollectionData) -> Result<SismaCollection> {
    let (id, session) = {
        let entity = owner.borrow();
        (entity.id(), entity.session())
    };
    if id.is_none() {
        return Ok(SismaCollection::new(data.referencing_type()));
    }
    let session = session.ok_or_else(|| detached(owner))?;
    session
        .model(data.referencing_type())?
        .collection_for(owner, data.name())
}

fn unknown_collection(entity: &Entity, name: &str) -> SismaError {
    SismaError::InvalidArgument(format!(
        "{} declares no collection '{}'",
        entity.entity_type(),
        name
    ))
}

fn detached(entity: &EntityRef) -> SismaError {
    let entity = entity.borrow();
    SismaError::Detached(format!(
        "{} #{}",
        entity.entity_type(),
        entity.id().unwrap_or(-1)
    ))
}
