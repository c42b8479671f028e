//! Inspect command implementation.

use serde::Serialize;
use shelfdb_core::Collection;
use std::path::Path;

/// Collection inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Collection path.
    pub path: String,
    /// Collection name.
    pub name: String,
    /// Backend in use.
    pub storage_type: String,
    /// DSN of the relational backend, empty for the tree backend.
    pub dsn_uri: String,
    /// Versioning policy.
    pub versioning: String,
    /// Creation time, RFC 3339.
    pub created: String,
    /// Number of objects.
    pub object_count: u64,
    /// Frame names.
    pub frames: Vec<String>,
    /// License from the descriptive metadata.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
}

/// Collects the inspection result for a collection.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let collection = Collection::open(path)?;
    let meta = collection.meta();
    let result = InspectResult {
        path: path.display().to_string(),
        name: meta.name.clone(),
        storage_type: meta.storage_type.to_string(),
        dsn_uri: meta.dsn_uri.clone(),
        versioning: meta.versioning.to_string(),
        created: meta.created.to_rfc3339(),
        object_count: collection.len()?,
        frames: collection.frame_names(),
        license: meta.metadata.license.clone(),
    };
    collection.close()?;
    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("ShelfDB Collection Inspection");
    println!("=============================");
    println!();
    println!("Path: {}", result.path);
    println!("Name: {}", result.name);
    println!("Created: {}", result.created);
    println!();
    println!("Storage:");
    println!("  Backend:    {}", result.storage_type);
    if !result.dsn_uri.is_empty() {
        println!("  DSN:        {}", result.dsn_uri);
    }
    println!("  Versioning: {}", result.versioning);
    println!();
    println!("Objects: {}", result.object_count);
    if !result.license.is_empty() {
        println!("License: {}", result.license);
    }

    if !result.frames.is_empty() {
        println!();
        println!("Frames:");
        for frame in &result.frames {
            println!("  {frame}");
        }
    }
}
