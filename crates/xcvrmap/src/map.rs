//! Map registry: the named fields of one hardware ABI revision.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::{
    codes::Codes,
    errors::DefinitionError,
    field::{Field, RegisterField},
};

/// Bytes per page in CMIS and SFF memory maps.
pub const PAGE_SIZE: u64 = 128;

/// Flat address of `offset` within `page`, using [PAGE_SIZE]-byte pages.
pub fn page_addr(page: u64, offset: u64) -> u64 {
    page_addr_sized(page, PAGE_SIZE, offset)
}

/// Flat address of `offset` within `page`, for maps with a non-standard page size.
pub fn page_addr_sized(page: u64, page_size: u64, offset: u64) -> u64 {
    page * page_size + offset
}

/// Immutable registry of fields for one ABI revision (e.g. "CMIS 5.0").
///
/// Construction validates every declaration and indexes every field,
/// including group children and number bit sub-fields, by name.
#[derive(Debug)]
pub struct RegisterMap {
    revision: String,
    codes: Codes,
    fields: Vec<Arc<Field>>,
    index: HashMap<String, Arc<Field>>,
}

impl RegisterMap {
    pub fn new(
        revision: impl Into<String>,
        codes: Codes,
        fields: Vec<Field>,
    ) -> Result<Self, DefinitionError> {
        let revision = revision.into();
        let mut index = HashMap::new();
        let mut top = Vec::with_capacity(fields.len());

        for field in fields {
            field.validate()?;
            let field = Arc::new(field);
            flatten(&field, &mut index)?;
            top.push(field);
        }

        debug!(
            "built register map {} with {} top-level and {} total fields",
            revision,
            top.len(),
            index.len()
        );

        Ok(RegisterMap {
            revision,
            codes,
            fields: top,
            index,
        })
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Code tables this map was built with.
    pub fn codes(&self) -> &Codes {
        &self.codes
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(Arc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Top-level declarations in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().map(Arc::as_ref)
    }

    /// Every addressable field name, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn flatten(
    field: &Arc<Field>,
    index: &mut HashMap<String, Arc<Field>>,
) -> Result<(), DefinitionError> {
    let name = field.name().to_string();
    if index.contains_key(&name) {
        return Err(DefinitionError::DuplicateField(name));
    }
    index.insert(name, Arc::clone(field));

    for member in field.members() {
        flatten(member, index)?;
    }

    Ok(())
}
