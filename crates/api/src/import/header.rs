use std::collections::HashMap;

use calamine::Data;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Folds a spreadsheet header (or any free-text code) into its lookup key:
/// lower-cased, accents removed, surrounding whitespace trimmed.
///
/// `"  Teléfono "`, `"TELEFONO"` and `"telefono"` all fold to `"telefono"`.
/// Applying it twice yields the same key as applying it once.
pub fn normalize_header(raw: &str) -> String {
    raw.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Canonical header key → zero-based column index for the first sheet row.
#[derive(Clone, Debug, Default)]
pub struct HeaderIndex {
    columns: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn from_row(row: &[Data]) -> Self {
        let mut columns = HashMap::new();
        for (col, cell) in row.iter().enumerate() {
            let Some(raw) = header_text(cell) else {
                continue;
            };
            let key = normalize_header(&raw);
            if key.is_empty() {
                continue;
            }
            // Later columns win on collision.
            columns.insert(key, col);
        }
        Self { columns }
    }

    /// Column of an already-normalized key.
    pub fn column(&self, key: &str) -> Option<usize> {
        self.columns.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn header_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        _ => None,
    }
}
