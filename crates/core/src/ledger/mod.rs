//! Cross-phase material reconciliation.
//!
//! The acceptance phase sees one logical row per physical material: the
//! replacement quantity proposed during inspection, the quantity recovered
//! during repair, and the quantity scrapped. The three quantities are
//! independent; none is derived from another. Rows are keyed by stable
//! material identity: catalog id when present, case-normalized name
//! otherwise. Recovered and scrap lines carry no catalog reference, so
//! they attach to an existing row by normalized name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::material::{normalize_name, MaterialKey, ReplacementLine, SalvageLine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementSlice {
    pub quantity: u32,
    pub new_purchase: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalvageSlice {
    pub quantity: u32,
    pub damage_pct: u8,
}

/// One logical material across all phases of a repair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedMaterialRow {
    pub key: MaterialKey,
    /// Display name as first entered; matching uses the normalized form.
    pub name: String,
    pub unit: String,
    pub replacement: Option<ReplacementSlice>,
    pub recovered: Option<SalvageSlice>,
    pub scrap: Option<SalvageSlice>,
}

#[derive(Default)]
struct MergeIndex {
    rows: Vec<MergedMaterialRow>,
    by_key: HashMap<MaterialKey, usize>,
    by_name: HashMap<String, usize>,
}

impl MergeIndex {
    fn row_for_replacement(&mut self, line: &ReplacementLine) -> usize {
        let key = line.material_key();
        if let Some(&index) = self.by_key.get(&key) {
            return index;
        }
        self.push_row(key, &line.name, &line.unit)
    }

    /// Salvage lines have no catalog reference; they join an existing row
    /// whose normalized name matches, falling back to a name-keyed row.
    fn row_for_salvage(&mut self, line: &SalvageLine) -> usize {
        let name_key = normalize_name(&line.name);
        if let Some(&index) = self.by_name.get(&name_key) {
            return index;
        }
        self.push_row(MaterialKey::Named(name_key), &line.name, &line.unit)
    }

    fn push_row(&mut self, key: MaterialKey, name: &str, unit: &str) -> usize {
        let index = self.rows.len();
        self.rows.push(MergedMaterialRow {
            key: key.clone(),
            name: name.to_owned(),
            unit: unit.to_owned(),
            replacement: None,
            recovered: None,
            scrap: None,
        });
        self.by_key.insert(key, index);
        // First row wins the name slot when display names collide.
        self.by_name.entry(normalize_name(name)).or_insert(index);
        index
    }
}

/// Merge inspection replacement lines with acceptance recovered/scrap
/// lines into one row per material identity. Lines landing on the same
/// row within one role have their quantities summed; the damage
/// percentage of the last line wins. Row order follows first appearance
/// (replacements, then recovered, then scrap).
pub fn merge_materials(
    replacements: &[ReplacementLine],
    recovered: &[SalvageLine],
    scrap: &[SalvageLine],
) -> Vec<MergedMaterialRow> {
    let mut index = MergeIndex::default();

    for line in replacements {
        let row = index.row_for_replacement(line);
        let slice = index.rows[row].replacement.get_or_insert(ReplacementSlice {
            quantity: 0,
            new_purchase: line.catalog_item_id().is_none(),
        });
        slice.quantity += line.quantity;
    }

    for line in recovered {
        let row = index.row_for_salvage(line);
        let slice = index.rows[row]
            .recovered
            .get_or_insert(SalvageSlice { quantity: 0, damage_pct: line.damage_pct });
        slice.quantity += line.quantity;
        slice.damage_pct = line.damage_pct;
    }

    for line in scrap {
        let row = index.row_for_salvage(line);
        let slice = index.rows[row]
            .scrap
            .get_or_insert(SalvageSlice { quantity: 0, damage_pct: line.damage_pct });
        slice.quantity += line.quantity;
        slice.damage_pct = line.damage_pct;
    }

    index.rows
}
