pub mod check;
pub mod query;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mongodict::config::CfFile;
use mongodict::dict::{MongoDictionary, OpenMode};
use mongodict::mongo::MongoConnector;

/// Load a table configuration file into a not-yet-connected table.
fn load_table(path: &Path) -> Result<MongoDictionary> {
    let cf = CfFile::load(path)
        .with_context(|| format!("Failed to load table config: {}", path.display()))?;
    let name = path.display().to_string();
    let dict = MongoDictionary::from_source(&name, OpenMode::ReadOnly, &cf, Arc::new(MongoConnector::new()))?;
    Ok(dict)
}
