use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mongodict::dict::Dictionary;

/// Execute the `query` command: look up each key and print the hits.
pub fn execute(config_path: &Path, keys: &[String]) -> Result<()> {
    let mut dict = super::load_table(config_path)?;

    let stdout = io::stdout();
    let failed = lookup_all(&mut dict, keys, &mut stdout.lock())?;
    Box::new(dict).close();

    if failed > 0 {
        anyhow::bail!("{failed} of {} lookup(s) failed", keys.len());
    }
    Ok(())
}

/// Print `key<TAB>value` for every key found. Absent keys print nothing.
/// Returns how many lookups failed.
fn lookup_all(dict: &mut dyn Dictionary, keys: &[String], out: &mut dyn Write) -> Result<usize> {
    let mut failed = 0;
    for key in keys {
        match dict.lookup(key) {
            Ok(Some(value)) => writeln!(out, "{key}\t{value}").context("Failed to write result")?,
            Ok(None) => tracing::debug!(key = %key, "not found"),
            Err(err) => {
                tracing::error!(key = %key, status = %err.status(), "lookup failed: {err}");
                failed += 1;
            }
        }
    }
    Ok(failed)
}
