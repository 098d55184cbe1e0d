//! Per entity type query surface.
//!
//! A [`Model`] is obtained from [`Session::model`] and covers one entity type:
//! lookups by id, searchable listings and, for properties referencing other
//! entities, filtering by the referenced entity. Reverse collections declared
//! on the registry are loaded through [`Model::collection_for`]. The tree
//! operations of self-referencing types live in [`crate::tree`].

use std::rc::Rc;

use tracing::debug;

use crate::adapter::Bindings;
use crate::collection::SismaCollection;
use crate::datatype::DataType;
use crate::entity::EntityRef;
use crate::error::{Result, SismaError};
use crate::mapper::DataMapper;
use crate::naming;
use crate::query::{ComparisonOperator, Indexing, Operand, Query};
use crate::schema::EntitySchema;
use crate::session::Session;

/// A filter on an entity valued property: `None` selects rows whose property
/// is null.
pub type EntityFilter<'a> = (&'a str, Option<&'a EntityRef>);

pub struct Model {
    session: Rc<Session>,
    schema: Rc<EntitySchema>,
    name: String,
}

impl Model {
    pub fn new(session: Rc<Session>, schema: Rc<EntitySchema>) -> Self {
        let name = naming::model_name(schema.name());
        Self {
            session,
            schema,
            name,
        }
    }
    /// Model type name, e.g. `Blog::Models::PostModel`.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn schema(&self) -> &Rc<EntitySchema> {
        &self.schema
    }
    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }
    pub(crate) fn mapper(&self) -> DataMapper {
        self.session.mapper()
    }

    // ------------- Base -------------
    pub fn get_entity_by_id(&self, id: i64) -> Result<Option<EntityRef>> {
        if let Some(entity) = self.session.cached(self.schema.name(), id) {
            return Ok(Some(entity));
        }
        let query = Query::select(self.schema.table()).where_condition(
            &self.schema.primary_key_column(),
            ComparisonOperator::Equal,
            Operand::Placeholder,
        );
        let mut bindings = Bindings::new();
        bindings.push_typed(id, DataType::Integer);
        self.mapper().find_first(&self.schema, &query, &bindings)
    }

    pub fn get_entity_collection(
        &self,
        search: Option<&str>,
        order: &[(&str, Indexing)],
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<SismaCollection> {
        self.get_entity_collection_by_entity(&[], search, order, offset, limit)
    }

    pub fn count_entity_collection(&self, search: Option<&str>) -> Result<i64> {
        self.count_entity_collection_by_entity(&[], search)
    }

    pub fn delete_entity_by_id(&self, id: i64) -> Result<bool> {
        let query = Query::delete(self.schema.table()).where_condition(
            &self.schema.primary_key_column(),
            ComparisonOperator::Equal,
            Operand::Placeholder,
        );
        let mut bindings = Bindings::new();
        bindings.push_typed(id, DataType::Integer);
        let deleted = self.mapper().execute(&query, &bindings)?;
        if let Some(entity) = self.session.cached(self.schema.name(), id) {
            entity.borrow_mut().set_id(None);
        }
        self.session.evict(self.schema.name(), id);
        Ok(deleted)
    }

    // ------------- Referenced -------------
    pub fn get_entity_collection_by_entity(
        &self,
        filters: &[EntityFilter<'_>],
        search: Option<&str>,
        order: &[(&str, Indexing)],
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<SismaCollection> {
        let Some((mut query, mut bindings)) = self.filtered(Query::select(self.schema.table()), filters)? else {
            return Ok(SismaCollection::new(self.schema.name()));
        };
        query = self.search(query, &mut bindings, search);
        if order.is_empty() {
            query = query.order_by(&self.schema.primary_key_column(), Indexing::Asc);
        }
        for (property, indexing) in order {
            query = query.order_by(&self.column(property)?, *indexing);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        self.mapper().find(&self.schema, &query, &bindings)
    }

    pub fn count_entity_collection_by_entity(
        &self,
        filters: &[EntityFilter<'_>],
        search: Option<&str>,
    ) -> Result<i64> {
        let Some((query, mut bindings)) = self.filtered(Query::count(self.schema.table()), filters)? else {
            return Ok(0);
        };
        let query = self.search(query, &mut bindings, search);
        self.mapper().get_count(&query, &bindings)
    }

    pub fn delete_entity_collection_by_entity(&self, filters: &[EntityFilter<'_>]) -> Result<bool> {
        let Some((query, bindings)) = self.filtered(Query::delete(self.schema.table()), filters)? else {
            return Ok(false);
        };
        let deleted = self.mapper().execute(&query, &bindings)?;
        if deleted {
            // the deleted rows are not known individually
            self.session.clear_cache();
        }
        Ok(deleted)
    }

    pub fn get_by(&self, property: &str, related: Option<&EntityRef>) -> Result<SismaCollection> {
        self.get_entity_collection_by_entity(&[(property, related)], None, &[], None, None)
    }
    pub fn count_by(&self, property: &str, related: Option<&EntityRef>) -> Result<i64> {
        self.count_entity_collection_by_entity(&[(property, related)], None)
    }
    pub fn delete_by(&self, property: &str, related: Option<&EntityRef>) -> Result<bool> {
        self.delete_entity_collection_by_entity(&[(property, related)])
    }

    /// Loads the collection `name` declared on `owner`'s type, whose members
    /// are of this model's type.
    pub fn collection_for(&self, owner: &EntityRef, name: &str) -> Result<SismaCollection> {
        let data = {
            let owner = owner.borrow();
            owner.schema().collection_data(name).ok_or_else(|| {
                SismaError::InvalidArgument(format!(
                    "{} declares no collection '{}'",
                    owner.entity_type(),
                    name
                ))
            })?
        };
        if data.referencing_type() != self.schema.name() {
            return Err(SismaError::InvalidType {
                expected: data.referencing_type().to_string(),
                actual: self.schema.name().to_string(),
            });
        }
        debug!(
            model = %self.name,
            method = %format!(
                "get{}By{}",
                naming::ucfirst(name),
                naming::ucfirst(data.referencing_property())
            ),
            "loading collection"
        );
        self.get_by(data.referencing_property(), Some(owner))
    }

    // ------------- Conditions -------------
    /// Adds one condition per filter. `None` when a filter names an unsaved
    /// entity, which no row can reference.
    fn filtered(&self, mut query: Query, filters: &[EntityFilter<'_>]) -> Result<Option<(Query, Bindings)>> {
        let mut bindings = Bindings::new();
        for (property, related) in filters {
            let field = self.schema.field(property).ok_or_else(|| {
                SismaError::InvalidArgument(format!(
                    "{} has no property '{}'",
                    self.schema.name(),
                    property
                ))
            })?;
            let Some(referenced_type) = field.kind().referenced_type() else {
                return Err(SismaError::InvalidArgument(format!(
                    "{}.{} does not reference an entity",
                    self.schema.name(),
                    property
                )));
            };
            match related {
                None => {
                    query = query.where_condition(
                        &field.column(),
                        ComparisonOperator::IsNull,
                        Operand::None,
                    );
                }
                Some(related) => {
                    let (related_type, id) = {
                        let related = related.borrow();
                        (related.entity_type().to_string(), related.id())
                    };
                    if related_type != referenced_type {
                        return Err(SismaError::InvalidType {
                            expected: referenced_type.to_string(),
                            actual: related_type,
                        });
                    }
                    let Some(id) = id else {
                        return Ok(None);
                    };
                    query = query.where_condition(
                        &field.column(),
                        ComparisonOperator::Equal,
                        Operand::Placeholder,
                    );
                    bindings.push_typed(id, DataType::Entity);
                }
            }
        }
        Ok(Some((query, bindings)))
    }

    /// Every searchable plain field contributes `column LIKE %search%`, all
    /// OR-joined.
    fn search(&self, query: Query, bindings: &mut Bindings, search: Option<&str>) -> Query {
        let Some(search) = search.filter(|s| !s.is_empty()) else {
            return query;
        };
        let columns: Vec<String> = self
            .schema
            .fields()
            .iter()
            .filter(|field| field.is_searchable() && !field.is_encrypted())
            .map(|field| field.column())
            .collect();
        if columns.is_empty() {
            debug!(model = %self.name, "no searchable properties, search ignored");
            return query;
        }
        let pattern = format!("%{}%", search);
        let conditions: Vec<(&str, ComparisonOperator, Operand)> = columns
            .iter()
            .map(|column| (column.as_str(), ComparisonOperator::Like, Operand::Placeholder))
            .collect();
        for _ in &columns {
            bindings.push_typed(pattern.as_str(), DataType::String);
        }
        query.where_any(&conditions)
    }

    fn column(&self, property: &str) -> Result<String> {
        if property == self.schema.primary_key() {
            return Ok(self.schema.primary_key_column());
        }
        self.schema
            .field(property)
            .map(|field| field.column())
            .ok_or_else(|| {
                SismaError::InvalidArgument(format!(
                    "{} has no property '{}' to order by",
                    self.schema.name(),
                    property
                ))
            })
    }
}
