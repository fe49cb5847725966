//! Package catalog
//!
//! The catalog maps a package id (`EP01`, `GP02`, ...) to a descriptor holding
//! its display name and where to download it from. It is built once at startup,
//! either from the bundled table or from a remote document, and handed to the
//! installer and the CLI by reference.
//!
//! Document format (bundled and remote):
//!
//! ```json
//! {
//!   "EP01": { "name": "Get to Work", "url": "https://..." },
//!   "EP99": { "name": "Split Pack", "parts": ["https://.../EP99.7z.001", "https://.../EP99.7z.002"] }
//! }
//! ```

pub mod remote;

pub use remote::RemoteCatalog;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// Catalog table shipped with the binary
const BUNDLED_CATALOG: &str = include_str!("../../assets/catalog.json");

/// Where a package is downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// One archive, extracted natively
    SingleFile(String),
    /// Split archive; part 1 first, the order the extraction tool expects
    MultiPart(Vec<String>),
}

impl PackageSource {
    /// Number of files that have to be downloaded
    pub fn file_count(&self) -> usize {
        match self {
            PackageSource::SingleFile(_) => 1,
            PackageSource::MultiPart(parts) => parts.len(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, PackageSource::MultiPart(_))
    }
}

/// Package category, derived from the two-letter id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Expansion,
    GamePack,
    StuffPack,
    FreePack,
    Other,
}

impl Category {
    pub fn from_id(id: &str) -> Self {
        let prefix: String = id.chars().take(2).collect::<String>().to_ascii_uppercase();
        match prefix.as_str() {
            "EP" => Category::Expansion,
            "GP" => Category::GamePack,
            "SP" => Category::StuffPack,
            "FP" => Category::FreePack,
            _ => Category::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Expansion => "Expansion Packs",
            Category::GamePack => "Game Packs",
            Category::StuffPack => "Stuff Packs & Kits",
            Category::FreePack => "Free Packs",
            Category::Other => "Other",
        }
    }
}

/// One installable package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub id: String,
    pub display_name: String,
    pub source: PackageSource,
}

impl PackageDescriptor {
    pub fn category(&self) -> Category {
        Category::from_id(&self.id)
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.display_name)
    }
}

/// Catalog parsing errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog root must be an object of id -> descriptor")]
    NotAnObject,

    #[error("Catalog contains no valid entries")]
    Empty,
}

/// Immutable id -> descriptor table
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: BTreeMap<String, PackageDescriptor>,
}

impl Catalog {
    /// The table compiled into the binary.
    pub fn bundled() -> Self {
        match Self::from_json(BUNDLED_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                // Only reachable if assets/catalog.json is broken at build time
                warn!("Bundled catalog unusable: {}", e);
                Self::default()
            }
        }
    }

    /// Parse a catalog document, skipping malformed entries.
    ///
    /// Fails only if the document itself is unusable or nothing valid is left.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let root: Value = serde_json::from_str(text)?;
        let Value::Object(entries) = root else {
            return Err(CatalogError::NotAnObject);
        };

        let mut packages = BTreeMap::new();
        for (id, entry) in &entries {
            match parse_entry(id, entry) {
                Some(descriptor) => {
                    packages.insert(descriptor.id.clone(), descriptor);
                }
                None => warn!("Skipping malformed catalog entry: {}", id),
            }
        }

        if packages.is_empty() {
            return Err(CatalogError::Empty);
        }

        debug!("Catalog loaded: {} packages", packages.len());
        Ok(Self { packages })
    }

    /// Ids are normalised to upper case, the same as parsed entries
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = PackageDescriptor>) -> Self {
        let packages = descriptors
            .into_iter()
            .map(|mut d| {
                d.id = d.id.trim().to_ascii_uppercase();
                (d.id.clone(), d)
            })
            .collect();
        Self { packages }
    }

    /// Look up a package (ids are matched case-insensitively)
    pub fn get(&self, id: &str) -> Option<&PackageDescriptor> {
        self.packages.get(&id.trim().to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.packages.values()
    }

    /// Packages that are not in the installed set
    pub fn available<'a>(
        &'a self,
        installed: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a PackageDescriptor> {
        self.packages
            .values()
            .filter(move |d| !installed.contains(&d.id))
    }

    /// Packages grouped by category, in category order
    pub fn grouped<'a>(
        &'a self,
        installed: Option<&'a BTreeSet<String>>,
    ) -> BTreeMap<Category, Vec<&'a PackageDescriptor>> {
        let mut groups: BTreeMap<Category, Vec<&PackageDescriptor>> = BTreeMap::new();
        for descriptor in self.packages.values() {
            if installed.is_some_and(|set| set.contains(&descriptor.id)) {
                continue;
            }
            groups.entry(descriptor.category()).or_default().push(descriptor);
        }
        groups
    }
}

/// Validate one `{ "name": ..., "url" | "parts": ... }` entry.
fn parse_entry(id: &str, entry: &Value) -> Option<PackageDescriptor> {
    let id = id.trim().to_ascii_uppercase();
    if id.is_empty() {
        return None;
    }

    let name = entry.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    // Parts win over url when both are present, matching how the list is consumed
    let source = if let Some(parts) = entry.get("parts") {
        let urls: Vec<String> = parts
            .as_array()?
            .iter()
            .map(|p| p.as_str().map(|s| s.trim().to_string()))
            .collect::<Option<Vec<_>>>()?;
        if urls.is_empty() || urls.iter().any(|u| u.is_empty()) {
            return None;
        }
        PackageSource::MultiPart(urls)
    } else {
        let url = entry.get("url")?.as_str()?.trim();
        if url.is_empty() {
            return None;
        }
        PackageSource::SingleFile(url.to_string())
    };

    Some(PackageDescriptor {
        id,
        display_name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_catalog_loads() {
        let catalog = Catalog::bundled();
        assert!(catalog.len() > 50);
        let ep01 = catalog.get("ep01").unwrap();
        assert_eq!(ep01.display_name, "Get to Work");
        assert!(matches!(ep01.source, PackageSource::SingleFile(_)));
        assert_eq!(ep01.category(), Category::Expansion);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let doc = r#"{
            "EP01": {"name": "Good", "url": "https://example.com/ep01.zip"},
            "EP02": {"name": "No source"},
            "EP03": {"url": "https://example.com/no-name.zip"},
            "EP04": {"name": "Bad parts", "parts": ["https://a", 5]},
            "EP05": {"name": "Empty parts", "parts": []},
            "gp06": {"name": "Split", "parts": ["https://a/1", "https://a/2"]},
            "SP07": "not an object"
        }"#;
        let catalog = Catalog::from_json(doc).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("EP01").is_some());
        let split = catalog.get("GP06").unwrap();
        assert_eq!(
            split.source,
            PackageSource::MultiPart(vec!["https://a/1".into(), "https://a/2".into()])
        );
        assert_eq!(split.source.file_count(), 2);
    }

    #[test]
    fn test_unusable_documents() {
        assert!(matches!(Catalog::from_json("[1, 2]"), Err(CatalogError::NotAnObject)));
        assert!(matches!(Catalog::from_json("{not json"), Err(CatalogError::Json(_))));
        assert!(matches!(
            Catalog::from_json(r#"{"EP01": {"name": "x"}}"#),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn test_available_excludes_installed() {
        let catalog = Catalog::from_json(
            r#"{
                "EP01": {"name": "One", "url": "https://x/1.zip"},
                "GP02": {"name": "Two", "url": "https://x/2.zip"},
                "SP03": {"name": "Three", "url": "https://x/3.zip"}
            }"#,
        )
        .unwrap();
        let installed: BTreeSet<String> = ["EP01".to_string()].into_iter().collect();
        let ids: Vec<_> = catalog.available(&installed).map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["GP02", "SP03"]);

        let groups = catalog.grouped(Some(&installed));
        assert!(!groups.contains_key(&Category::Expansion));
        assert_eq!(groups[&Category::GamePack].len(), 1);
    }

    #[test]
    fn test_category_from_id() {
        assert_eq!(Category::from_id("EP12"), Category::Expansion);
        assert_eq!(Category::from_id("gp01"), Category::GamePack);
        assert_eq!(Category::from_id("SP58"), Category::StuffPack);
        assert_eq!(Category::from_id("FP01"), Category::FreePack);
        assert_eq!(Category::from_id("XX01"), Category::Other);
    }

    #[test]
    fn test_from_descriptors_normalises_ids() {
        let catalog = Catalog::from_descriptors([PackageDescriptor {
            id: " gp04 ".to_string(),
            display_name: "Vampires".to_string(),
            source: PackageSource::SingleFile("https://github.com/x/GP04.zip".to_string()),
        }]);

        let gp04 = catalog.get("GP04").unwrap();
        assert_eq!(gp04.id, "GP04");
        assert!(catalog.get("gp04").is_some());
        assert_eq!(catalog.grouped(None)[&Category::GamePack].len(), 1);
    }
}
