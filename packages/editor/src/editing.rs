//! # Editing controller
//!
//! Owns the editing view and keeps it in sync with the model. After every
//! change block the pending differ changes are downcast into the view, so
//! the view is patched incrementally instead of being rebuilt.

use crate::errors::EditorResult;
use folio_conversion::{convert_selection, Conversion, Mapper};
use folio_model::{Model, RootState};
use folio_view::{ViewSelection, ViewTree};
use tracing::{debug, warn};

/// Element name of editable view roots.
pub const VIEW_ROOT_ELEMENT: &str = "div";

#[derive(Debug, Default)]
pub struct EditingController {
    view: ViewTree,
    mapper: Mapper,
    selection: ViewSelection,
}

impl EditingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut Mapper {
        &mut self.mapper
    }

    pub fn selection(&self) -> &ViewSelection {
        &self.selection
    }

    /// Creates the view root of a model root and binds the two.
    pub fn attach_root(&mut self, model: &Model, name: &str) -> EditorResult<()> {
        let Some(model_root) = model.document().get_root(name) else {
            warn!(root = name, "Cannot attach a root the model does not have");
            return Ok(());
        };
        if self.view.root(name).is_some() {
            return Ok(());
        }
        let view_root = self.view.create_root(name, VIEW_ROOT_ELEMENT)?;
        self.mapper.bind_elements(model_root, view_root);
        debug!(root = name, "Attached editing root");
        Ok(())
    }

    fn detach_root(&mut self, name: &str) -> EditorResult<()> {
        if let Some(view_root) = self.view.root(name) {
            self.mapper.unbind_view_element(view_root);
            self.view.remove_root(name)?;
            debug!(root = name, "Detached editing root");
        }
        Ok(())
    }

    /// Downcasts everything the model changed since the last call.
    pub fn convert_changes(&mut self, model: &mut Model, conversion: &Conversion) -> EditorResult<()> {
        let changes = model.document_mut().flush_changes();
        for root in &changes.roots {
            match root.state {
                Some(RootState::Attached) => self.attach_root(model, &root.name)?,
                Some(RootState::Detached) => self.detach_root(&root.name)?,
                None => {}
            }
        }
        if !changes.is_empty() {
            conversion
                .editing_downcast()
                .convert_changes(&changes, model.document(), &mut self.view, &mut self.mapper)?;
        }
        self.selection = convert_selection(model.document(), model.schema(), &self.view, &self.mapper);
        Ok(())
    }
}
