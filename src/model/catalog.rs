use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::model::error::CatalogError;

/// Name of a record type known to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A one-to-many relation declared on an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub child_type: EntityType,
}

impl RelationDef {
    pub fn new(name: &str, child_type: &str) -> Self {
        Self {
            name: name.to_string(),
            child_type: EntityType::from(child_type),
        }
    }
}

fn default_identity_field() -> String {
    "id".to_string()
}

/// Static description of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Unique-field sets. Only the first member of each set is checked.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl EntityDescriptor {
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: EntityType::from(entity_type),
            identity_field: default_identity_field(),
            relations: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn with_identity_field(mut self, field: &str) -> Self {
        self.identity_field = field.to_string();
        self
    }

    pub fn with_relation(mut self, name: &str, child_type: &str) -> Self {
        self.relations.push(RelationDef::new(name, child_type));
        self
    }

    pub fn with_unique(mut self, fields: &[&str]) -> Self {
        self.unique
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// Metadata source consulted by the planner, the executor and the unique checker
pub trait SchemaCatalog: Send + Sync {
    fn identity_field(&self, entity_type: &EntityType) -> Result<&str, CatalogError>;

    fn one_to_many_relations(
        &self,
        entity_type: &EntityType,
    ) -> Result<&[RelationDef], CatalogError>;

    fn unique_field_sets(&self, entity_type: &EntityType) -> Result<&[Vec<String>], CatalogError>;

    /// Flatten unique sets to single field names. Multi-field sets contribute
    /// their first member only.
    fn unique_fields(&self, entity_type: &EntityType) -> Result<Vec<String>, CatalogError> {
        let sets = self.unique_field_sets(entity_type)?;
        let mut fields = Vec::with_capacity(sets.len());
        for set in sets {
            if set.len() > 1 {
                warn!(
                    "Unique set {:?} on '{}' spans several fields; only '{}' is checked",
                    set, entity_type, set[0]
                );
            }
            if let Some(first) = set.first() {
                if !fields.contains(first) {
                    fields.push(first.clone());
                }
            }
        }
        Ok(fields)
    }
}

/// Catalog built from descriptors and validated up front
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entities: HashMap<EntityType, EntityDescriptor>,
}

impl StaticCatalog {
    pub fn new(descriptors: Vec<EntityDescriptor>) -> Result<Self, CatalogError> {
        let mut entities = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if descriptor.identity_field.is_empty() {
                return Err(CatalogError::EmptyIdentityField(descriptor.entity_type));
            }
            let entity_type = descriptor.entity_type.clone();
            if entities.insert(entity_type.clone(), descriptor).is_some() {
                return Err(CatalogError::DuplicateEntityType(entity_type));
            }
        }

        let catalog = Self { entities };
        catalog.validate_relations()?;
        catalog.validate_acyclic()?;
        Ok(catalog)
    }

    /// Load descriptors from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let descriptors: Vec<EntityDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;
        Ok(Self::new(descriptors)?)
    }

    pub fn descriptor(&self, entity_type: &EntityType) -> Result<&EntityDescriptor, CatalogError> {
        self.entities
            .get(entity_type)
            .ok_or_else(|| CatalogError::UnknownEntityType(entity_type.clone()))
    }

    fn validate_relations(&self) -> Result<(), CatalogError> {
        for descriptor in self.entities.values() {
            for relation in &descriptor.relations {
                if !self.entities.contains_key(&relation.child_type) {
                    return Err(CatalogError::UnresolvedRelation {
                        entity_type: descriptor.entity_type.clone(),
                        relation: relation.name.clone(),
                        child_type: relation.child_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Aggregates must be trees, so no entity type may reach itself through relations.
    fn validate_acyclic(&self) -> Result<(), CatalogError> {
        let mut finished: HashSet<&EntityType> = HashSet::new();
        for start in self.entities.keys() {
            let mut path = Vec::new();
            self.visit(start, &mut path, &mut finished)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        entity_type: &'a EntityType,
        path: &mut Vec<&'a EntityType>,
        finished: &mut HashSet<&'a EntityType>,
    ) -> Result<(), CatalogError> {
        if finished.contains(entity_type) {
            return Ok(());
        }
        if path.contains(&entity_type) {
            let mut cycle: Vec<String> = path.iter().map(|t| t.to_string()).collect();
            cycle.push(entity_type.to_string());
            return Err(CatalogError::CyclicRelation(cycle.join(" -> ")));
        }

        path.push(entity_type);
        if let Some(descriptor) = self.entities.get(entity_type) {
            for relation in &descriptor.relations {
                self.visit(&relation.child_type, path, finished)?;
            }
        }
        path.pop();
        finished.insert(entity_type);
        Ok(())
    }
}

impl SchemaCatalog for StaticCatalog {
    fn identity_field(&self, entity_type: &EntityType) -> Result<&str, CatalogError> {
        Ok(self.descriptor(entity_type)?.identity_field.as_str())
    }

    fn one_to_many_relations(
        &self,
        entity_type: &EntityType,
    ) -> Result<&[RelationDef], CatalogError> {
        Ok(&self.descriptor(entity_type)?.relations)
    }

    fn unique_field_sets(&self, entity_type: &EntityType) -> Result<&[Vec<String>], CatalogError> {
        Ok(&self.descriptor(entity_type)?.unique)
    }
}
