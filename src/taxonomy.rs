// 🏷️ Category taxonomy - legacy labels mapped onto the storefront's categories
//
// The mapping is data, not code: the built-in table ships with the binary and
// a JSON file can replace it. Every mapping target must resolve to itself so
// a second reconciliation pass never changes anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::MappingError;

/// Lookup key used for products with no category
pub const GENERAL_KEY: &str = "General";

/// Fallback category for uncategorized products
pub const DEFAULT_CATEGORY: &str = "Oficina";

/// Canonical storefront categories
pub const CANONICAL_CATEGORIES: &[&str] = &[
    "Oficina",
    "Tecnología",
    "Moda",
    "Hogar",
    "Bebidas",
    "Bolsas",
    "Deportes",
    "Ecológicos",
    "Salud",
];

const BUILTIN_MAPPINGS: &[(&str, &str)] = &[
    // Apparel
    ("Ropa", "Moda"),
    ("Textil", "Moda"),
    ("Textiles", "Moda"),
    ("Playeras", "Moda"),
    ("Gorras", "Moda"),
    ("Accesorios", "Moda"),
    // Office and writing
    ("Escritura", "Oficina"),
    ("Bolígrafos", "Oficina"),
    ("Plumas", "Oficina"),
    ("Papelería", "Oficina"),
    ("Libretas", "Oficina"),
    ("Agendas", "Oficina"),
    // Technology
    ("Electrónica", "Tecnología"),
    ("Tecnologia", "Tecnología"),
    ("Tecnología", "Tecnología"),
    ("USB", "Tecnología"),
    ("Audio", "Tecnología"),
    // Drinkware
    ("Tazas", "Bebidas"),
    ("Termos", "Bebidas"),
    ("Cilindros", "Bebidas"),
    // Bags
    ("Mochilas", "Bolsas"),
    ("Maletas", "Bolsas"),
    ("Portafolios", "Bolsas"),
    // Home
    ("Hogar y Cocina", "Hogar"),
    ("Cocina", "Hogar"),
    ("Herramientas", "Hogar"),
    // Sports
    ("Deporte", "Deportes"),
    ("Fitness", "Deportes"),
    // Eco
    ("Eco", "Ecológicos"),
    ("Ecologicos", "Ecológicos"),
    // Wellness
    ("Cuidado Personal", "Salud"),
    ("Antiestrés", "Salud"),
];

/// On-disk form of a mapping override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFile {
    #[serde(default = "default_category")]
    pub default_category: String,

    pub mappings: BTreeMap<String, String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Validated old-label -> new-label table plus the fallback category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMapping {
    mappings: BTreeMap<String, String>,
    default_category: String,
}

impl CategoryMapping {
    /// Build and validate a mapping
    pub fn new(
        mappings: BTreeMap<String, String>,
        default_category: &str,
    ) -> Result<Self, MappingError> {
        let mapping = CategoryMapping {
            mappings,
            default_category: default_category.to_string(),
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// The storefront's built-in taxonomy with `DEFAULT_CATEGORY` as fallback
    pub fn builtin() -> Self {
        CategoryMapping {
            mappings: BUILTIN_MAPPINGS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }

    /// Built-in table with a different fallback category
    pub fn builtin_with_default(default_category: &str) -> Result<Self, MappingError> {
        Self::new(Self::builtin().mappings, default_category)
    }

    /// Load a mapping from JSON (`{"default_category": "...", "mappings": {...}}`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, MappingError> {
        let file: MappingFile = serde_json::from_str(content)?;
        Self::new(file.mappings, &file.default_category)
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.mappings.get(label).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mappings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Final category for a current label
    ///
    /// Empty labels are looked up as `GENERAL_KEY`. A mapped label takes its
    /// target; an unmapped `GENERAL_KEY` takes the default; anything else is
    /// kept as is.
    pub fn resolve<'a>(&'a self, current: &'a str) -> &'a str {
        let key = if current.is_empty() { GENERAL_KEY } else { current };

        match self.mappings.get(key) {
            Some(target) => target.as_str(),
            None if key == GENERAL_KEY => self.default_category.as_str(),
            None => current,
        }
    }

    fn validate(&self) -> Result<(), MappingError> {
        if self.default_category.trim().is_empty() {
            return Err(MappingError::EmptyDefault);
        }

        let resolved_default = self.resolve(&self.default_category);
        if resolved_default != self.default_category {
            return Err(MappingError::DefaultRemapped {
                default: self.default_category.clone(),
                to: resolved_default.to_string(),
            });
        }

        for (from, to) in &self.mappings {
            if to.trim().is_empty() {
                return Err(MappingError::EmptyTarget(from.clone()));
            }

            let next = self.resolve(to);
            if next != to.as_str() {
                return Err(MappingError::Chain {
                    from: from.clone(),
                    via: to.clone(),
                    to: next.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for CategoryMapping {
    fn default() -> Self {
        Self::builtin()
    }
}
