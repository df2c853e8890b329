use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a category's frames are grouped on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBy {
    Filter,
    Temperature,
}

impl std::fmt::Display for SearchBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchBy::Filter => write!(f, "filter"),
            SearchBy::Temperature => write!(f, "temperature"),
        }
    }
}

/// One image category: where its frames are stored locally, how they are
/// grouped, and how to find them remotely.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    /// Local folder name under the storage root.
    pub storage_folder: String,
    /// The attribute frames are grouped by.
    pub search_by: SearchBy,
    /// Attribute values present for this category (filter bands or
    /// temperature setpoints).
    pub attributes: Vec<String>,
    /// Per-attribute lists of filename keyword groups; each group maps to
    /// one planned directory.
    pub keywords: BTreeMap<String, Vec<Vec<String>>>,
    /// Per-attribute remote folder identifiers.
    pub remote_folders: BTreeMap<String, String>,
}

/// Catalog of image categories, loaded from an external JSON file rather
/// than kept as in-process constant state.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CategoryCatalog {
    pub categories: BTreeMap<String, Category>,
}

/// One planned entry: where files for a category/attribute/keyword group
/// land locally, and the terms that locate them remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub category: String,
    pub attribute: String,
    pub keywords: Vec<String>,
    pub remote_folder: String,
    pub local_dir: PathBuf,
    /// Filename fragments a remote query would match: the FITS extension,
    /// the category name, then the keyword group.
    pub search_terms: Vec<String>,
}

/// Directories touched by `ensure_layout`.
#[derive(Debug, Default)]
pub struct LayoutReport {
    pub created: Vec<PathBuf>,
    pub existing: Vec<PathBuf>,
}

impl CategoryCatalog {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let catalog: CategoryCatalog = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every listed attribute must carry keyword groups and a remote
    /// folder identifier.
    pub fn validate(&self) -> Result<()> {
        for (name, category) in &self.categories {
            if category.attributes.is_empty() {
                bail!("Category '{}' lists no attributes", name);
            }
            for attribute in &category.attributes {
                let groups = match category.keywords.get(attribute) {
                    Some(groups) if !groups.is_empty() => groups,
                    _ => bail!(
                        "Category '{}' has no keyword groups for attribute '{}'",
                        name,
                        attribute
                    ),
                };
                debug!(category = name.as_str(), attribute = attribute.as_str(),
                       groups = groups.len(), "validated attribute");
                if !category.remote_folders.contains_key(attribute) {
                    bail!(
                        "Category '{}' has no remote folder for attribute '{}'",
                        name,
                        attribute
                    );
                }
            }
        }
        Ok(())
    }

    /// Plan the local directory layout under `root`, one entry per
    /// category/attribute/keyword group.
    ///
    /// The attribute level is omitted from the path when the attribute
    /// already appears among the keywords; an empty keyword group stops
    /// at the attribute directory.
    pub fn layout(&self, root: &Path) -> Vec<PlannedEntry> {
        let mut entries = Vec::new();
        for (name, category) in &self.categories {
            for attribute in &category.attributes {
                let groups = match category.keywords.get(attribute) {
                    Some(groups) => groups,
                    None => continue,
                };
                let remote_folder = match category.remote_folders.get(attribute) {
                    Some(id) => id.clone(),
                    None => continue,
                };
                for group in groups {
                    let mut local_dir = root.join(&category.storage_folder);
                    if !group.contains(attribute) {
                        local_dir.push(attribute);
                    }
                    if !group.is_empty() {
                        local_dir.push(group.join("_"));
                    }

                    let mut search_terms = vec![".fit".to_string(), name.clone()];
                    search_terms.extend(group.iter().cloned());

                    entries.push(PlannedEntry {
                        category: name.clone(),
                        attribute: attribute.clone(),
                        keywords: group.clone(),
                        remote_folder: remote_folder.clone(),
                        local_dir,
                        search_terms,
                    });
                }
            }
        }
        entries
    }

    /// Create the planned directories, skipping those already present.
    pub fn ensure_layout(&self, root: &Path) -> Result<LayoutReport> {
        let mut report = LayoutReport::default();
        for entry in self.layout(root) {
            if entry.local_dir.is_dir() {
                report.existing.push(entry.local_dir);
            } else {
                fs::create_dir_all(&entry.local_dir).with_context(|| {
                    format!("Failed to create directory: {}", entry.local_dir.display())
                })?;
                report.created.push(entry.local_dir);
            }
        }
        Ok(report)
    }
}
