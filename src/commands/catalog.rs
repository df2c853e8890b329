use anyhow::Result;
use std::path::Path;

use crate::catalog::CategoryCatalog;

/// Validate a catalog file, print its layout plan, and optionally create
/// the local directories.
pub fn plan_catalog(catalog_path: &str, root: &str, create: bool) -> Result<()> {
    let catalog_path = Path::new(catalog_path);
    let root = Path::new(root);

    let catalog = CategoryCatalog::from_file(catalog_path)?;
    println!(
        "Catalog {} is valid: {} categories",
        catalog_path.display(),
        catalog.categories.len()
    );

    let entries = catalog.layout(root);
    println!(
        "{:<18} {:<12} {:<14} {:<22} {:<40}",
        "Category", "Grouped By", "Attribute", "Remote Folder", "Local Directory"
    );
    println!("{:-<108}", "");
    for entry in &entries {
        let search_by = &catalog.categories[&entry.category].search_by;
        println!(
            "{:<18} {:<12} {:<14} {:<22} {:<40}",
            entry.category,
            search_by.to_string(),
            entry.attribute,
            entry.remote_folder,
            entry.local_dir.display()
        );
    }
    println!("\nTotal: {} planned directories", entries.len());

    if create {
        let report = catalog.ensure_layout(root)?;
        for dir in &report.existing {
            println!("{} exists, skipping", dir.display());
        }
        for dir in &report.created {
            println!("Created {}", dir.display());
        }
        println!(
            "Done: {} created, {} already present",
            report.created.len(),
            report.existing.len()
        );
    }

    Ok(())
}
