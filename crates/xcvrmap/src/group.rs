//! Group fields: ordered aggregates of child fields decoded in one call.
//!
//! A group spans from its lowest child offset to the furthest child extent.
//! Children may leave gaps and may be declared in any address order.
//!
//! Decoding runs in two passes:
//! 1. children without dependencies decode with the caller's context only;
//! 2. children with dependencies decode with the caller's context merged
//!    with the pass 1 results.
//!
//! A pass 2 child cannot depend on another pass 2 child. Longer chains are
//! resolved by the caller, see [crate::accessor::Accessor::read_sequence].

use std::collections::BTreeMap;
use std::sync::Arc;

use log::trace;

use crate::{
    errors::{DecodeError, DefinitionError, EncodeError},
    field::{
        Field, RegisterField, WriteMode, ensure_len, ensure_writable, require_current,
        type_mismatch,
    },
    value::{Resolved, Value},
};

#[derive(Debug, Clone)]
pub struct GroupField {
    name: String,
    offset: u64,
    size: usize,
    read_only: bool,
    fields: Vec<Arc<Field>>,
}

impl GroupField {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let offset = fields.iter().map(|f| f.offset()).min().unwrap_or(0);
        let end = fields
            .iter()
            .map(|f| f.offset() + f.size() as u64)
            .max()
            .unwrap_or(offset);

        GroupField {
            name: name.into(),
            offset,
            size: (end - offset) as usize,
            read_only: false,
            fields: fields.into_iter().map(Arc::new).collect(),
        }
    }

    /// Marks the group itself read-only. Children keep their own flags.
    pub fn ro(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Children in declaration order.
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.fields.is_empty() {
            return Err(DefinitionError::EmptyGroup(self.name.clone()));
        }

        for field in &self.fields {
            field.validate()?;
        }

        Ok(())
    }

    /// Position of `field` inside the group's byte span.
    fn local(&self, field: &Field) -> std::ops::Range<usize> {
        let start = (field.offset() - self.offset) as usize;
        start..start + field.size()
    }

    /// True when `value` leaves any child unnamed, at any depth.
    ///
    /// Encoding a partial value must start from the bytes currently stored.
    pub fn is_partial(&self, value: &Value) -> bool {
        let Some(members) = value.as_group() else {
            return false;
        };

        self.fields.iter().any(|field| match members.get(field.name()) {
            None => true,
            Some(member) => field
                .as_group()
                .is_some_and(|group| group.is_partial(member)),
        })
    }

    /// True when the children leave no byte of the span uncovered.
    fn covers_span(&self) -> bool {
        let mut covered = vec![false; self.size];
        for field in &self.fields {
            for byte in &mut covered[self.local(field)] {
                *byte = true;
            }
        }

        covered.into_iter().all(|b| b)
    }
}

impl RegisterField for GroupField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn write_mode(&self) -> WriteMode {
        let partial = self.fields.iter().any(|f| f.read_before_write());
        if partial || !self.covers_span() {
            WriteMode::ReadModifyWrite
        } else {
            WriteMode::Direct
        }
    }

    fn decode(&self, raw: &[u8], deps: &Resolved) -> Result<Value, DecodeError> {
        ensure_len(&self.name, raw, self.size)?;

        let mut result = BTreeMap::new();
        for field in self.fields.iter().filter(|f| f.dependencies().is_empty()) {
            trace!("{}: decoding {}", self.name, field.name());
            let value = field.decode(&raw[self.local(field)], deps)?;
            result.insert(field.name().to_string(), value);
        }

        let dependent: Vec<&Arc<Field>> = self
            .fields
            .iter()
            .filter(|f| !f.dependencies().is_empty())
            .collect();
        if !dependent.is_empty() {
            let mut context = deps.clone();
            context.extend(result.iter().map(|(k, v)| (k.clone(), v.clone())));

            for field in dependent {
                trace!(
                    "{}: decoding {} with {:?}",
                    self.name,
                    field.name(),
                    field.dependencies()
                );
                let value = field.decode(&raw[self.local(field)], &context)?;
                result.insert(field.name().to_string(), value);
            }
        }

        Ok(Value::Group(result))
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        let members = value
            .as_group()
            .ok_or_else(|| type_mismatch(&self.name, value))?;

        for member in members.keys() {
            if !self.fields.iter().any(|f| f.name() == member) {
                return Err(EncodeError::UnknownMember {
                    group: self.name.clone(),
                    member: member.clone(),
                });
            }
        }

        let partial = self.write_mode() == WriteMode::ReadModifyWrite || self.is_partial(value);
        let mut out = if partial {
            require_current(&self.name, current, self.size)?.to_vec()
        } else {
            vec![0u8; self.size]
        };

        for field in &self.fields {
            let Some(member) = members.get(field.name()) else {
                continue;
            };

            let range = self.local(field);
            let encoded = field.encode(member, Some(&out[range.clone()]))?;
            out[range].copy_from_slice(&encoded);
        }

        Ok(out)
    }
}
