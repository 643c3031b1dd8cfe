use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogItemId(pub String);

/// Where a replacement line is sourced from. The two arms are mutually
/// exclusive by construction: a line either draws a catalog item from
/// existing stock or names a part to be purchased new.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplacementSource {
    Catalog { catalog_item_id: CatalogItemId },
    NewPurchase,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementLine {
    pub source: ReplacementSource,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub specification: Option<String>,
    pub code: Option<String>,
    pub notes: Option<String>,
}

/// A part removed during repair and kept (`recovered`) or discarded
/// (`scrap`), with the assessed damage percentage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalvageLine {
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub damage_pct: u8,
}

/// Stable material identity used for cross-phase reconciliation: the
/// catalog id when the line references one, otherwise the case-normalized
/// name. Distinct new-purchase materials with identical names share a key;
/// there is no stronger identity available for them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKey {
    Catalog(CatalogItemId),
    Named(String),
}

impl MaterialKey {
    pub fn from_name(name: &str) -> Self {
        Self::Named(normalize_name(name))
    }
}

pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl ReplacementLine {
    pub fn material_key(&self) -> MaterialKey {
        match &self.source {
            ReplacementSource::Catalog { catalog_item_id } => {
                MaterialKey::Catalog(catalog_item_id.clone())
            }
            ReplacementSource::NewPurchase => MaterialKey::from_name(&self.name),
        }
    }

    pub fn catalog_item_id(&self) -> Option<&CatalogItemId> {
        match &self.source {
            ReplacementSource::Catalog { catalog_item_id } => Some(catalog_item_id),
            ReplacementSource::NewPurchase => None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("replacement line name is empty".to_owned()));
        }
        if self.quantity == 0 {
            return Err(DomainError::Validation(format!(
                "replacement line `{}` has zero quantity",
                self.name
            )));
        }
        Ok(())
    }
}

impl SalvageLine {
    pub fn material_key(&self) -> MaterialKey {
        MaterialKey::from_name(&self.name)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("material line name is empty".to_owned()));
        }
        if self.quantity == 0 {
            return Err(DomainError::Validation(format!(
                "material line `{}` has zero quantity",
                self.name
            )));
        }
        if self.damage_pct > 100 {
            return Err(DomainError::Validation(format!(
                "material line `{}` damage percentage {} exceeds 100",
                self.name, self.damage_pct
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CatalogItemId, MaterialKey, ReplacementLine, ReplacementSource, SalvageLine,
    };

    fn catalog_line(id: &str, name: &str, quantity: u32) -> ReplacementLine {
        ReplacementLine {
            source: ReplacementSource::Catalog { catalog_item_id: CatalogItemId(id.to_string()) },
            name: name.to_string(),
            quantity,
            unit: "pcs".to_string(),
            specification: None,
            code: None,
            notes: None,
        }
    }

    #[test]
    fn catalog_line_keys_by_catalog_id() {
        let line = catalog_line("CAT-42", "Bearing 6204", 3);
        assert_eq!(line.material_key(), MaterialKey::Catalog(CatalogItemId("CAT-42".to_string())));
    }

    #[test]
    fn new_purchase_line_keys_by_normalized_name() {
        let line = ReplacementLine {
            source: ReplacementSource::NewPurchase,
            name: "  Gasket  ".to_string(),
            quantity: 1,
            unit: "pcs".to_string(),
            specification: None,
            code: None,
            notes: None,
        };
        assert_eq!(line.material_key(), MaterialKey::Named("gasket".to_string()));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let line = catalog_line("CAT-1", "Fuse", 0);
        assert!(line.validate().is_err());
    }

    #[test]
    fn damage_pct_above_hundred_is_rejected() {
        let line = SalvageLine {
            name: "Rotor".to_string(),
            quantity: 1,
            unit: "pcs".to_string(),
            damage_pct: 101,
        };
        assert!(line.validate().is_err());
    }

    #[test]
    fn salvage_line_within_bounds_is_valid() {
        let line = SalvageLine {
            name: "Rotor".to_string(),
            quantity: 2,
            unit: "pcs".to_string(),
            damage_pct: 100,
        };
        assert!(line.validate().is_ok());
    }
}
