//! Table formatting for CLI output, adapted from the reference CLI's
//! `output::table` builder.

use comfy_table::{ContentArrangement, Table as ComfyTable};

pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { headers: Vec::new(), rows: Vec::new() }
    }

    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn build(self) -> String {
        let mut table = ComfyTable::new();
        table.set_header(&self.headers);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        for row in self.rows {
            table.add_row(row);
        }
        table.to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
