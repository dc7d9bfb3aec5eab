// ⚙️ Settings shared by the CLI and the admin server
//
// Every option can come from a flag or from the environment (a `.env` file is
// loaded first by the binaries).

use clap::Args;
use std::path::PathBuf;

use crate::error::MappingError;
use crate::taxonomy::CategoryMapping;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite database holding the catalog
    #[arg(long, env = "STOREFRONT_DB", default_value = "storefront.db", global = true)]
    pub db: PathBuf,

    /// JSON file replacing the built-in category mapping
    #[arg(long, env = "STOREFRONT_CATEGORY_MAP", global = true)]
    pub category_map: Option<PathBuf>,

    /// Category given to products with no category
    #[arg(long, env = "STOREFRONT_DEFAULT_CATEGORY", global = true)]
    pub default_category: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "STOREFRONT_LOG_JSON", global = true)]
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db: PathBuf::from("storefront.db"),
            category_map: None,
            default_category: None,
            log_json: false,
        }
    }
}

impl Settings {
    /// Resolve the category mapping these settings describe
    ///
    /// A mapping file supplies its own default; `default_category` overrides
    /// it when given.
    pub fn category_mapping(&self) -> Result<CategoryMapping, MappingError> {
        let base = match &self.category_map {
            Some(path) => CategoryMapping::from_file(path)?,
            None => CategoryMapping::builtin(),
        };

        match &self.default_category {
            Some(default) if default != base.default_category() => {
                let table = base.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                CategoryMapping::new(table, default)
            }
            _ => Ok(base),
        }
    }
}
