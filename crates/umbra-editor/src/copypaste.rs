//! Copy, cut and paste of items.
//!
//! The buffer holds saved records: the copied items and the subjects they
//! show. Pasting loads the items back under fresh ids, in one transaction.

use crate::error::EditorError;
use crate::persist::{ElementLoader, ElementRecord, ItemLoader, ItemRecord, lookup_in};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use umbra_core::ElementId;
use umbra_core::geometry::Affine;

/// Session-scoped copy buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyBuffer {
    pub items: Vec<ItemRecord>,
    pub subjects: Vec<ElementRecord>,
}

impl CopyBuffer {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Session {
    /// Replace the buffer with `items` and their subjects.
    pub fn copy(&mut self, items: &[ElementId]) -> Result<(), EditorError> {
        let mut buffer = CopyBuffer::default();
        let mut seen = HashSet::new();
        for &item in items {
            buffer.items.push(self.item_record(item)?);
            if let Some(subject) = self.subject(item)
                && seen.insert(subject)
            {
                buffer.subjects.push(self.element_record(subject)?);
            }
        }
        log::debug!(
            "copied {} items, {} subjects",
            buffer.items.len(),
            buffer.subjects.len()
        );
        self.clipboard = buffer;
        Ok(())
    }

    /// Copy `items`, then unlink them in one transaction. Subjects stay.
    pub fn cut(&mut self, items: &[ElementId]) -> Result<(), EditorError> {
        self.copy(items)?;
        self.transaction(|s| {
            for &item in items {
                if s.contains(item) {
                    s.unlink(item)?;
                }
            }
            Ok(())
        })
    }

    pub fn copy_buffer(&self) -> &CopyBuffer {
        &self.clipboard
    }

    /// Paste the buffer onto `diagram`. Items get fresh ids and are offset
    /// by the configured paste offset. Subjects that no longer exist are
    /// recreated under their old ids. Connections come back only when both
    /// ends were copied. Returns the new items in copy order.
    pub fn paste(&mut self, diagram: ElementId) -> Result<Vec<ElementId>, EditorError> {
        let buffer = self.clipboard.clone();
        if buffer.is_empty() {
            return Ok(Vec::new());
        }
        let (dx, dy) = self.config().paste_offset;
        self.diagram(diagram)?;

        self.transaction(|s| {
            let mut map: HashMap<ElementId, ElementId> = HashMap::new();
            let mut recreated: Vec<ElementLoader> = Vec::new();
            for record in &buffer.subjects {
                map.insert(record.id, record.id);
                if !s.contains(record.id) {
                    let loader = record.loader()?;
                    s.create_element(&loader)?;
                    recreated.push(loader);
                }
            }
            for loader in &mut recreated {
                let graph = s.graph();
                loader.retain_references(|id| graph.contains(id));
                let refs: Vec<ElementId> = loader.references().collect();
                for id in refs {
                    map.insert(id, id);
                }
            }

            let mut loaders: Vec<ItemLoader> = Vec::with_capacity(buffer.items.len());
            let mut pasted = Vec::with_capacity(buffer.items.len());
            for record in &buffer.items {
                let mut loader = record.loader()?;
                loader.matrix = Affine::translate((dx, dy)) * loader.matrix;
                let id = s.materialize_item(diagram, &loader, None)?;
                map.insert(record.id, id);
                pasted.push(id);
                loaders.push(loader);
            }

            s.postload(&recreated, &loaders, &lookup_in(&map))?;
            log::debug!("pasted {} items onto {diagram}", pasted.len());
            Ok(pasted)
        })
    }
}
