//! Diagnostics store — accumulates per-document diagnostics from one
//! build server.

use std::collections::HashMap;

use gantry_types::{BuildDiagnostic, DiagnosticsSnapshot};

pub(crate) struct DiagnosticsStore {
    data: HashMap<String, Vec<BuildDiagnostic>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Apply one `build/publishDiagnostics` batch for a document.
    ///
    /// `reset` replaces the document's existing set; otherwise the items
    /// append to it. A reset with no items removes the document entirely.
    pub fn update(&mut self, document: String, items: Vec<BuildDiagnostic>, reset: bool) {
        if reset {
            if items.is_empty() {
                self.data.remove(&document);
            } else {
                self.data.insert(document, items);
            }
        } else if !items.is_empty() {
            self.data.entry(document).or_default().extend(items);
        }
    }

    /// Drop everything. Called when the session closes.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut documents: Vec<(String, Vec<BuildDiagnostic>)> = self
            .data
            .iter()
            .map(|(document, items)| (document.clone(), items.clone()))
            .collect();

        // Sort: documents with errors first, then alphabetically
        documents.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(documents)
    }
}
