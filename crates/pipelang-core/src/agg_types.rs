//! Aggregate type definitions
//!
//! The inference pass treats aggregate definitions as a read-only oracle: it
//! asks for a type's ordered field list by name and never changes it. An
//! earlier frontend pass is expected to fill an [`AggregateTable`] from the
//! source `type` declarations.

use crate::diag::TypeErrorKind;
use crate::types::ConcreteType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: ConcreteType,
}

/// A named record type with an ordered list of typed fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl AggregateDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Oracle answering aggregate-definition queries during graph construction
/// and solving.
pub trait AggregateResolver {
    /// Look up an aggregate definition by type name
    fn resolve(&self, name: &str) -> Option<&AggregateDef>;

    /// Whether any known aggregate declares a field with this name
    fn declares_field(&self, field: &str) -> bool;
}

/// Aggregate definitions in declaration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateTable {
    defs: IndexMap<String, AggregateDef>,
}

impl AggregateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define an aggregate type.
    ///
    /// Fails if the name is already taken or a field name repeats.
    pub fn define<I, N>(&mut self, name: impl Into<String>, fields: I) -> Result<&AggregateDef, TypeErrorKind>
    where
        I: IntoIterator<Item = (N, ConcreteType)>,
        N: Into<String>,
    {
        let name = name.into();
        if self.defs.contains_key(&name) {
            return Err(TypeErrorKind::DuplicateAggregate { name });
        }

        let mut seen: Vec<FieldDef> = Vec::new();
        for (field_name, ty) in fields {
            let field_name = field_name.into();
            if seen.iter().any(|f| f.name == field_name) {
                return Err(TypeErrorKind::DuplicateField {
                    aggregate: name,
                    field: field_name,
                });
            }
            seen.push(FieldDef { name: field_name, ty });
        }

        let entry = self.defs.entry(name.clone()).or_insert(AggregateDef { name, fields: seen });
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregateDef> {
        self.defs.values()
    }
}

impl AggregateResolver for AggregateTable {
    fn resolve(&self, name: &str) -> Option<&AggregateDef> {
        self.defs.get(name)
    }

    fn declares_field(&self, field: &str) -> bool {
        self.defs.values().any(|def| def.field(field).is_some())
    }
}
