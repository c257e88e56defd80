//! Table formatting for CLI output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::codec::FieldEntry;
use crate::model::{ModelMetadata, ModelState};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// One row per field of a segment directory.
pub fn create_directory_table(entries: &[FieldEntry]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Field", "Dim", "Space", "Vectors", "Stride", "Offset", "Length", "Digest", "Model",
    ]);

    for entry in entries {
        builder = builder.add_row(vec![
            entry.name.clone(),
            entry.dimension.to_string(),
            entry.space_type.to_string(),
            entry.vector_count.to_string(),
            entry.stride.to_string(),
            entry.offset.to_string(),
            entry.length.to_string(),
            entry
                .digest
                .map(|d| format!("{d:08x}"))
                .unwrap_or_else(|| "-".to_string()),
            entry
                .model
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    builder.build()
}

/// Model listing with the training state highlighted.
pub fn create_models_table(models: &[ModelMetadata]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Model").add_attribute(Attribute::Bold),
        Cell::new("Family").add_attribute(Attribute::Bold),
        Cell::new("Dim").add_attribute(Attribute::Bold),
        Cell::new("Space").add_attribute(Attribute::Bold),
        Cell::new("State").add_attribute(Attribute::Bold),
        Cell::new("Created").add_attribute(Attribute::Bold),
    ]);

    for model in models {
        let color = match model.state {
            ModelState::Trained => Color::Green,
            ModelState::Failed => Color::Red,
            ModelState::Created | ModelState::Training => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(&model.model_id),
            Cell::new(model.family),
            Cell::new(model.dimension),
            Cell::new(model.space_type),
            Cell::new(model.state).fg(color),
            Cell::new(&model.created_at),
        ]);
    }

    table.to_string()
}
