//! Trees of self-referencing entities.
//!
//! A schema built with [`crate::schema::EntitySchemaBuilder::self_referenced`]
//! carries a nullable `parent<ShortName>` property and a `sonCollection` of
//! children. Walking the tree tracks visited identifiers, so rows whose parent
//! chain loops back fail with [`SismaError::CyclicReference`] instead of
//! recursing forever, and stops at [`crate::settings::SessionOptions`]'s
//! maximum depth.

use std::collections::HashSet;

use tracing::debug;

use crate::collection::SismaCollection;
use crate::entity::{EntityRef, ReferencedEntity};
use crate::error::{Result, SismaError};
use crate::model::Model;
use crate::query::Indexing;
use crate::schema::SON_COLLECTION;

impl Model {
    /// Children of `parent`, or the roots for `None`.
    pub fn get_entity_collection_by_parent(
        &self,
        parent: Option<&EntityRef>,
        order: &[(&str, Indexing)],
    ) -> Result<SismaCollection> {
        let property = self.parent_property()?;
        self.get_entity_collection_by_entity(&[(property.as_str(), parent)], None, order, None, None)
    }

    /// The subtree below `parent` (the whole forest for `None`). Every node's
    /// `sonCollection` is replaced by its loaded children.
    pub fn get_entity_tree(
        &self,
        parent: Option<&EntityRef>,
        order: &[(&str, Indexing)],
    ) -> Result<SismaCollection> {
        let mut visited = HashSet::new();
        if let Some(id) = parent.and_then(|p| p.borrow().id()) {
            visited.insert(id);
        }
        let tree = self.build_tree(parent, order, &mut visited, 0)?;
        if let Some(parent) = parent {
            parent.set_collection(SON_COLLECTION, Some(tree.clone()))?;
        }
        debug!(model = %self.name(), nodes = visited.len(), "tree loaded");
        Ok(tree)
    }

    /// Deletes `root` and all of its descendants, deepest first, in one
    /// transaction.
    pub fn delete_entity_tree(&self, root: &EntityRef) -> Result<bool> {
        self.parent_property()?;
        let Some(id) = root.borrow().id() else {
            return Ok(false);
        };
        self.mapper().transactional(|| {
            let mut visited = HashSet::from([id]);
            self.delete_subtree(root, &mut visited, 0)
        })
    }

    fn build_tree(
        &self,
        parent: Option<&EntityRef>,
        order: &[(&str, Indexing)],
        visited: &mut HashSet<i64>,
        depth: usize,
    ) -> Result<SismaCollection> {
        let children = self.get_entity_collection_by_parent(parent, order)?;
        self.check_depth(&children, depth)?;
        for child in children.iter() {
            self.visit(child, visited)?;
            let grandchildren = self.build_tree(Some(child), order, visited, depth + 1)?;
            child.set_collection(SON_COLLECTION, Some(grandchildren))?;
        }
        Ok(children)
    }

    fn delete_subtree(
        &self,
        node: &EntityRef,
        visited: &mut HashSet<i64>,
        depth: usize,
    ) -> Result<bool> {
        let children = self.get_entity_collection_by_parent(Some(node), &[])?;
        self.check_depth(&children, depth)?;
        for child in children.iter() {
            self.visit(child, visited)?;
            self.delete_subtree(child, visited, depth + 1)?;
        }
        self.mapper().delete(node)
    }

    fn visit(&self, node: &EntityRef, visited: &mut HashSet<i64>) -> Result<()> {
        let Some(id) = node.borrow().id() else {
            return Ok(());
        };
        if !visited.insert(id) {
            return Err(SismaError::CyclicReference {
                entity: self.schema().name().to_string(),
                id,
            });
        }
        Ok(())
    }

    fn check_depth(&self, children: &SismaCollection, depth: usize) -> Result<()> {
        let max_depth = self.session().options().max_tree_depth;
        if !children.is_empty() && depth >= max_depth {
            return Err(SismaError::DepthExceeded(max_depth));
        }
        Ok(())
    }

    fn parent_property(&self) -> Result<String> {
        self.schema()
            .parent_property()
            .map(str::to_string)
            .ok_or_else(|| {
                SismaError::InvalidArgument(format!(
                    "{} does not reference itself",
                    self.schema().name()
                ))
            })
    }
}
