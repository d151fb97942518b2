//! Ranked header aliases and header canonicalization.
//!
//! Every canonical field owns an ordered list of fallback header names. The
//! canonical name is always tried first, then the aliases in the order they
//! are listed; the first header present in the source wins. The built-in
//! table can be extended or overridden from a YAML file:
//!
//! ```yaml
//! aliases:
//!   VENDEDOR: [VENDEDOR_NOMBRE, EMPLEADO, ASESOR, REPRESENTANTE]
//!   CLIENTE: [RAZON_SOCIAL]
//! required:
//!   sales: [CLIENTE, FECHA, MONTO]
//! ```
//!
//! Lists given in the file replace the built-in list for that field.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use heck::ToShoutySnakeCase;
use serde::{Deserialize, Serialize};

/// Normalizes a header for matching: trimmed, upper-cased, words joined by `_`.
pub fn canonical_header(name: &str) -> String {
    name.trim().to_shouty_snake_case()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequiredOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasTable {
    #[serde(default)]
    aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub required: RequiredOverrides,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            aliases: BTreeMap::new(),
            required: RequiredOverrides::default(),
        }
    }

    pub fn builtin() -> Self {
        Self::empty()
            .with_aliases("COD_PROD", &["PRODUCTO", "ITEM", "SKU", "CODIGO"])
            .with_aliases("VENDEDOR", &["VENDEDOR_NOMBRE", "EMPLEADO", "ASESOR"])
            .with_aliases("ARTICULO", &["ITEM", "PRODUCTO", "DESCRIPCION"])
            .with_aliases("META_CANTIDAD", &["CANTIDAD_META", "CANTIDAD"])
            .with_aliases("META_MONTO", &["MONTO_META", "MONTO"])
    }

    /// Loads a YAML alias file and layers it over the built-in table.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening alias file {path:?}"))?;
        let overrides: AliasTable = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing alias YAML {path:?}"))?;
        Ok(Self::builtin().merged_with(overrides))
    }

    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn with_aliases(mut self, canonical: &str, aliases: &[&str]) -> Self {
        self.aliases.insert(
            canonical_header(canonical),
            aliases.iter().map(|a| canonical_header(a)).collect(),
        );
        self
    }

    pub fn merged_with(mut self, overrides: AliasTable) -> Self {
        for (canonical, aliases) in overrides.aliases {
            self.aliases.insert(
                canonical_header(&canonical),
                aliases.iter().map(|a| canonical_header(a)).collect(),
            );
        }
        if overrides.required.sales.is_some() {
            self.required.sales = overrides.required.sales;
        }
        if overrides.required.targets.is_some() {
            self.required.targets = overrides.required.targets;
        }
        self
    }

    pub fn aliases_for(&self, canonical: &str) -> &[String] {
        self.aliases
            .get(canonical)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Canonical name followed by its aliases, in match priority order.
    pub fn candidates(&self, canonical: &str) -> Vec<String> {
        std::iter::once(canonical.to_string())
            .chain(self.aliases_for(canonical).iter().cloned())
            .collect()
    }
}
