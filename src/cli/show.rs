use anyhow::{Context, Result};
use std::path::Path;

use hoard::record::GenericRecord;
use hoard::registry::Registry;

/// Rebuild each stored record through its producer type and print it.
///
/// Malformed lines are reported on stderr and skipped.
pub fn show(file: &Path, kind: &str, origin: Option<&str>, summary: bool) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let registry = Registry::from_global();

    let mut shown = 0u64;
    let mut skipped = 0u64;

    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let generic: GenericRecord = match serde_json::from_str(line) {
            Ok(generic) => generic,
            Err(e) => {
                eprintln!("Warning: line {}: {e}", idx + 1);
                skipped += 1;
                continue;
            }
        };
        let label = origin.unwrap_or(generic.header.origin.as_str()).to_string();
        let record = registry.reconstruct(kind, &generic, &label)?;

        if summary {
            println!("{}  {}", record.created_at().format("%Y-%m-%d %H:%M"), record.summary());
        } else {
            println!("{}\n", record.render());
        }
        shown += 1;
    }

    eprintln!("Shown: {shown}");
    if skipped > 0 {
        eprintln!("Skipped: {skipped}");
    }
    Ok(())
}
