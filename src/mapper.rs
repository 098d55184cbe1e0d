use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::adapter::Bindings;
use crate::cipher::PropertyCipher;
use crate::collection::SismaCollection;
use crate::datatype::{DataType, Value};
use crate::entity::{Entity, EntityRef, Reference};
use crate::error::{Result, SismaError};
use crate::hydrator::Hydrator;
use crate::query::Query;
use crate::schema::EntitySchema;
use crate::session::Session;

/// Moves entities between memory and the store.
pub struct DataMapper {
    session: Rc<Session>,
}

impl DataMapper {
    pub fn new(session: Rc<Session>) -> Self {
        Self { session }
    }

    // ------------- Writing -------------
    /// Inserts or updates `entity`. Unsaved or modified entities it references
    /// are saved first, members of collections loaded on it afterwards, all in
    /// one transaction unless the caller already opened one.
    /// `Ok(false)` when the session has no connection.
    pub fn save(&self, entity: &EntityRef) -> Result<bool> {
        self.transactional(|| {
            let mut visited = HashSet::new();
            self.save_cascade(entity, &mut visited)
        })
    }

    /// Runs `work` inside a transaction when none is active. If it fails the
    /// transaction is rolled back and every entity written meanwhile gets its
    /// previous id, values and identity cache entry back.
    pub(crate) fn transactional<T>(&self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let adapter = self.session.adapter();
        let owned = !adapter.in_transaction() && adapter.begin_transaction()?;
        if owned {
            self.session.open_journal();
        }
        let outcome = work().and_then(|result| {
            if owned {
                adapter.commit_transaction()?;
            }
            Ok(result)
        });
        match outcome {
            Ok(result) => {
                if owned {
                    self.session.close_journal();
                }
                Ok(result)
            }
            Err(error) => {
                if owned {
                    if let Err(rollback) = adapter.rollback_transaction() {
                        warn!(error = %rollback, "rollback failed");
                    }
                    self.session.undo_journal();
                }
                Err(error)
            }
        }
    }

    fn save_cascade(
        &self,
        entity: &EntityRef,
        visited: &mut HashSet<*const RefCell<Entity>>,
    ) -> Result<bool> {
        if !visited.insert(Rc::as_ptr(entity)) {
            return Ok(true);
        }
        let referenced: Vec<EntityRef> = {
            let current = entity.borrow();
            current
                .schema()
                .fields()
                .iter()
                .filter(|field| field.kind().referenced_type().is_some())
                .filter_map(|field| current.value(field.name()))
                .filter_map(Value::as_reference)
                .filter_map(Reference::entity)
                .collect()
        };
        for target in referenced {
            if Rc::ptr_eq(&target, entity) || !needs_saving(&target) {
                continue;
            }
            self.save_cascade(&target, visited)?;
        }

        let id = entity.borrow().id();
        let saved = match id {
            None => self.insert(entity)?,
            Some(_) if entity.borrow().is_modified() => self.update(entity)?,
            Some(_) => true,
        };

        let members: Vec<EntityRef> = entity
            .borrow()
            .loaded_collections()
            .flat_map(|(_, collection)| collection.to_vec())
            .collect();
        for member in members {
            if needs_saving(&member) {
                self.save_cascade(&member, visited)?;
            }
        }
        Ok(saved)
    }

    pub fn insert(&self, entity: &EntityRef) -> Result<bool> {
        let schema = Rc::clone(entity.borrow().schema());
        entity.borrow().check_assigned()?;
        self.session.record(entity);
        self.refresh_initialization_vector(entity, &schema);
        let (columns, bindings) = self.row(entity, &schema)?;
        let adapter = self.session.adapter();
        let table = adapter.escape_identifier(schema.table());
        let command = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            let columns: Vec<String> = columns
                .iter()
                .map(|column| adapter.escape_identifier(column))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            )
        };
        if !adapter.execute(&command, &bindings)? {
            return Ok(false);
        }
        let id = adapter.last_insert_id();
        {
            let mut inserted = entity.borrow_mut();
            inserted.set_id(Some(id));
            inserted.mark_saved();
            inserted.attach(&self.session);
        }
        self.session.cache(entity);
        debug!(entity = schema.name(), id, "inserted");
        Ok(true)
    }

    pub fn update(&self, entity: &EntityRef) -> Result<bool> {
        let schema = Rc::clone(entity.borrow().schema());
        let id = entity.borrow().id().ok_or_else(|| {
            SismaError::InvalidArgument(format!("cannot update an unsaved {}", schema.name()))
        })?;
        entity.borrow().check_assigned()?;
        self.session.record(entity);
        self.refresh_initialization_vector(entity, &schema);
        let (columns, mut bindings) = self.row(entity, &schema)?;
        if columns.is_empty() {
            entity.borrow_mut().mark_saved();
            return Ok(true);
        }
        let adapter = self.session.adapter();
        let assignments: Vec<String> = columns
            .iter()
            .map(|column| format!("{} = ?", adapter.escape_identifier(column)))
            .collect();
        let command = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            adapter.escape_identifier(schema.table()),
            assignments.join(", "),
            adapter.escape_identifier(&schema.primary_key_column())
        );
        bindings.push_typed(id, DataType::Integer);
        if !adapter.execute(&command, &bindings)? {
            return Ok(false);
        }
        {
            let mut updated = entity.borrow_mut();
            updated.mark_saved();
            updated.attach(&self.session);
        }
        self.session.cache(entity);
        debug!(entity = schema.name(), id, "updated");
        Ok(true)
    }

    /// Deletes the row of `entity` and forgets its identifier. `Ok(false)` for
    /// an unsaved entity.
    pub fn delete(&self, entity: &EntityRef) -> Result<bool> {
        let (schema, id) = {
            let current = entity.borrow();
            (Rc::clone(current.schema()), current.id())
        };
        let Some(id) = id else {
            return Ok(false);
        };
        self.session.record(entity);
        let adapter = self.session.adapter();
        let command = format!(
            "DELETE FROM {} WHERE {} = ?",
            adapter.escape_identifier(schema.table()),
            adapter.escape_identifier(&schema.primary_key_column())
        );
        let mut bindings = Bindings::new();
        bindings.push_typed(id, DataType::Integer);
        if !adapter.execute(&command, &bindings)? {
            return Ok(false);
        }
        self.session.evict(schema.name(), id);
        entity.borrow_mut().set_id(None);
        debug!(entity = schema.name(), id, "deleted");
        Ok(true)
    }

    // ------------- Reading -------------
    pub fn find(
        &self,
        schema: &Rc<EntitySchema>,
        query: &Query,
        bindings: &Bindings,
    ) -> Result<SismaCollection> {
        let mut collection = SismaCollection::new(schema.name());
        let command = query.command(self.session.adapter());
        let Some(mut result) = self.session.adapter().select(&command, bindings)? else {
            return Ok(collection);
        };
        let hydrator = Hydrator::new(&self.session, Rc::clone(schema));
        while let Some(record) = result.fetch() {
            collection.append(hydrator.hydrate(&record)?)?;
        }
        result.release();
        Ok(collection)
    }

    pub fn find_first(
        &self,
        schema: &Rc<EntitySchema>,
        query: &Query,
        bindings: &Bindings,
    ) -> Result<Option<EntityRef>> {
        let query = query.clone().limit(1);
        Ok(self.find(schema, &query, bindings)?.first().cloned())
    }

    /// Runs a count query, `0` without a connection.
    pub fn get_count(&self, query: &Query, bindings: &Bindings) -> Result<i64> {
        let command = query.command(self.session.adapter());
        let Some(mut result) = self.session.adapter().select(&command, bindings)? else {
            return Ok(0);
        };
        let count = match result.fetch() {
            Some(record) => match record.get("_numrows") {
                Some(rusqlite::types::Value::Integer(count)) => *count,
                other => {
                    return Err(SismaError::Hydration(format!(
                        "count query returned {:?}",
                        other
                    )))
                }
            },
            None => 0,
        };
        result.release();
        Ok(count)
    }

    /// Runs a query that returns no rows, such as a delete.
    pub fn execute(&self, query: &Query, bindings: &Bindings) -> Result<bool> {
        let command = query.command(self.session.adapter());
        self.session.adapter().execute(&command, bindings)
    }

    // ------------- Row values -------------
    fn refresh_initialization_vector(&self, entity: &EntityRef, schema: &EntitySchema) {
        if let Some(property) = schema.initialization_vector() {
            entity
                .borrow_mut()
                .put(property, Value::Text(PropertyCipher::generate_iv()));
        }
    }

    /// Columns and bound values of every field but the primary key, with
    /// encrypted properties already encrypted.
    fn row(&self, entity: &EntityRef, schema: &EntitySchema) -> Result<(Vec<String>, Bindings)> {
        let current = entity.borrow();
        let iv = schema
            .initialization_vector()
            .and_then(|property| current.value(property))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut columns = Vec::with_capacity(schema.fields().len());
        let mut bindings = Bindings::new();
        for field in schema.fields() {
            let value = current.value(field.name()).cloned().unwrap_or(Value::Null);
            columns.push(field.column());
            if field.is_encrypted() && !value.is_null() {
                let cipher = self.session.cipher().ok_or_else(|| {
                    SismaError::Encryption(format!(
                        "{}.{} is encrypted but no encryption key is configured",
                        schema.name(),
                        field.name()
                    ))
                })?;
                let iv = iv.as_deref().ok_or_else(|| {
                    SismaError::Encryption(format!(
                        "{} has no initialization vector",
                        schema.name()
                    ))
                })?;
                let plaintext = match &value {
                    Value::Binary(bytes) => bytes.clone(),
                    other => other.to_plain_string().unwrap_or_default().into_bytes(),
                };
                let ciphertext = cipher.encrypt(field.name(), &plaintext, iv)?;
                bindings.push_typed(ciphertext, DataType::String);
            } else {
                bindings.push_typed(value, field.kind().data_type());
            }
        }
        Ok((columns, bindings))
    }
}

fn needs_saving(entity: &EntityRef) -> bool {
    let entity = entity.borrow();
    entity.id().is_none() || entity.is_modified()
}
