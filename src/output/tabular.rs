//! Flattened CSV projection of the parent stream

use crate::model::{Parent, ParentRow};
use crate::output::traits::OutputResult;
use crate::storage::write_atomic;
use std::path::Path;

/// Renders parents as CSV with a header row
///
/// Fields containing a comma, quote, or line break are quoted, with embedded
/// quotes doubled.
pub fn render_parent_csv(parents: &[Parent]) -> String {
    let mut out = String::new();
    push_record(&mut out, ParentRow::HEADER.iter().copied());
    for parent in parents {
        let fields = ParentRow::from(parent).fields();
        push_record(&mut out, fields.iter().map(String::as_str));
    }
    out
}

/// Atomically writes the CSV projection to `path`
pub fn write_parent_csv(path: &Path, parents: &[Parent]) -> OutputResult<()> {
    write_atomic(path, render_parent_csv(parents).as_bytes())?;
    tracing::info!("Wrote {} threads to {}", parents.len(), path.display());
    Ok(())
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}
