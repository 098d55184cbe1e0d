use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::adapter::Adapter;
use crate::cipher::PropertyCipher;
use crate::entity::{Entity, EntityRef, EntityState};
use crate::error::Result;
use crate::mapper::DataMapper;
use crate::model::Model;
use crate::schema::SchemaRegistry;
use crate::settings::{SessionOptions, Settings};

// ------------- Session -------------
/// The request-scoped context every model, mapper and entity works through.
///
/// A session owns the adapter (and so the connection), the schema registry,
/// the optional property cipher and an identity cache. The cache maps
/// `(entity type, id)` to the instance currently loaded, so a row hydrated
/// twice within one session yields the same entity and lazy references resolve
/// without another query. It holds entities weakly and never keeps them alive.
#[derive(Debug)]
pub struct Session {
    adapter: Adapter,
    registry: SchemaRegistry,
    cipher: Option<PropertyCipher>,
    options: SessionOptions,
    cache: RefCell<HashMap<(String, i64), Weak<RefCell<Entity>>>>,
    journal: RefCell<Option<Vec<(EntityRef, EntityState)>>>,
}

pub struct SessionBuilder {
    adapter: Adapter,
    registry: SchemaRegistry,
    cipher: Option<PropertyCipher>,
    options: SessionOptions,
}

impl SessionBuilder {
    pub fn cipher(mut self, cipher: PropertyCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }
    pub fn build(self) -> Rc<Session> {
        Rc::new(Session {
            adapter: self.adapter,
            registry: self.registry,
            cipher: self.cipher,
            options: self.options,
            cache: RefCell::new(HashMap::new()),
            journal: RefCell::new(None),
        })
    }
}

impl Session {
    pub fn builder(adapter: Adapter, registry: SchemaRegistry) -> SessionBuilder {
        SessionBuilder {
            adapter,
            registry,
            cipher: None,
            options: SessionOptions::default(),
        }
    }
    pub fn new(adapter: Adapter, registry: SchemaRegistry) -> Rc<Self> {
        Self::builder(adapter, registry).build()
    }
    /// Connects a new adapter from `settings` and derives the property cipher
    /// from the configured encryption key, if any.
    pub fn open(settings: &Settings, registry: SchemaRegistry) -> Result<Rc<Self>> {
        let adapter = Adapter::new();
        adapter.connect(&settings.connection)?;
        let mut builder = Self::builder(adapter, registry).options(settings.session.clone());
        if let Some(key) = &settings.encryption.key {
            builder = builder.cipher(PropertyCipher::from_passphrase(key));
        }
        Ok(builder.build())
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
    pub fn cipher(&self) -> Option<&PropertyCipher> {
        self.cipher.as_ref()
    }
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn model(self: &Rc<Self>, entity_type: &str) -> Result<Model> {
        let schema = self.registry.schema(entity_type)?;
        Ok(Model::new(Rc::clone(self), schema))
    }
    pub fn mapper(self: &Rc<Self>) -> DataMapper {
        DataMapper::new(Rc::clone(self))
    }
    /// A new unsaved entity attached to this session.
    pub fn create_entity(self: &Rc<Self>, entity_type: &str) -> Result<EntityRef> {
        let entity = Entity::create(self.registry.schema(entity_type)?);
        entity.borrow_mut().attach(self);
        Ok(entity)
    }
    /// The entity with this id, from the identity cache or the store.
    pub fn find_entity(self: &Rc<Self>, entity_type: &str, id: i64) -> Result<Option<EntityRef>> {
        if let Some(entity) = self.cached(entity_type, id) {
            trace!(entity = entity_type, id, "identity cache hit");
            return Ok(Some(entity));
        }
        self.model(entity_type)?.get_entity_by_id(id)
    }

    // ------------- Identity cache -------------
    pub fn cached(&self, entity_type: &str, id: i64) -> Option<EntityRef> {
        let key = (entity_type.to_string(), id);
        let mut cache = self.cache.borrow_mut();
        match cache.get(&key).map(Weak::upgrade) {
            Some(Some(entity)) => Some(entity),
            Some(None) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }
    pub(crate) fn cache(&self, entity: &EntityRef) {
        let key = {
            let entity = entity.borrow();
            match entity.id() {
                Some(id) => (entity.entity_type().to_string(), id),
                None => return,
            }
        };
        self.cache.borrow_mut().insert(key, Rc::downgrade(entity));
    }
    pub(crate) fn evict(&self, entity_type: &str, id: i64) {
        self.cache
            .borrow_mut()
            .remove(&(entity_type.to_string(), id));
    }
    // ------------- Rollback journal -------------
    /// Starts recording the state of every entity written until the journal
    /// is closed or undone.
    pub(crate) fn open_journal(&self) {
        *self.journal.borrow_mut() = Some(Vec::new());
    }
    /// Keeps the state `entity` has before a write, if a journal is open.
    pub(crate) fn record(&self, entity: &EntityRef) {
        if let Some(journal) = self.journal.borrow_mut().as_mut() {
            journal.push((Rc::clone(entity), entity.borrow().snapshot()));
        }
    }
    pub(crate) fn close_journal(&self) {
        self.journal.borrow_mut().take();
    }
    /// Puts every recorded entity back the way it was, latest write first,
    /// together with its identity cache entry.
    pub(crate) fn undo_journal(&self) {
        let Some(journal) = self.journal.borrow_mut().take() else {
            return;
        };
        debug!(entries = journal.len(), "undoing writes of a rolled back transaction");
        for (entity, state) in journal.into_iter().rev() {
            let (entity_type, current) = {
                let entity = entity.borrow();
                (entity.entity_type().to_string(), entity.id())
            };
            if let Some(id) = current {
                self.evict(&entity_type, id);
            }
            entity.borrow_mut().restore(state);
            self.cache(&entity);
        }
    }

    /// Forgets every loaded entity; later reads hydrate fresh instances.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        debug!(entries = cache.len(), "clearing identity cache");
        cache.clear();
    }
    pub fn cache_len(&self) -> usize {
        self.cache
            .borrow()
            .values()
            .filter(|entity| entity.strong_count() > 0)
            .count()
    }
}
