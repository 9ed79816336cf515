//! Static reference data: items, recipes, spawn table and economic constants.
//!
//! Immutable for the lifetime of a run.

use std::collections::BTreeMap;

/// Wallet every new account starts with.
pub const STARTING_WALLET: i64 = 100;
/// Rent per tick, when the Banker is configured to charge it.
pub const RENT_PER_TICK: i64 = 2;
/// Advisory inventory ceiling for agents.
pub const MAX_INVENTORY: u32 = 50;
pub const MAX_ACTIONS_PER_TICK: u32 = 5;
pub const HEARTBEAT_TIMEOUT_TICKS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemCategory {
    Raw,
    Food,
    Material,
    Housing,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Raw => "raw",
            ItemCategory::Food => "food",
            ItemCategory::Material => "material",
            ItemCategory::Housing => "housing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueItem {
    pub name: &'static str,
    pub category: ItemCategory,
    /// Reference price in whole coins
    pub base_price: u32,
    pub craftable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub name: &'static str,
    pub inputs: &'static [(&'static str, u32)],
    pub output: &'static str,
    pub output_quantity: u32,
    /// Craft duration in ticks
    pub ticks: u64,
    pub tier: u8,
}

impl Recipe {
    /// Inputs as an owned map, comparable with a `craft_start` payload.
    pub fn inputs_map(&self) -> BTreeMap<String, u32> {
        self.inputs
            .iter()
            .map(|(item, qty)| (item.to_string(), *qty))
            .collect()
    }
}

pub const ITEMS: &[CatalogueItem] = &[
    CatalogueItem { name: "potato", category: ItemCategory::Raw, base_price: 2, craftable: false },
    CatalogueItem { name: "onion", category: ItemCategory::Raw, base_price: 2, craftable: false },
    CatalogueItem { name: "wood", category: ItemCategory::Raw, base_price: 3, craftable: false },
    CatalogueItem { name: "nails", category: ItemCategory::Raw, base_price: 1, craftable: false },
    CatalogueItem { name: "stone", category: ItemCategory::Raw, base_price: 4, craftable: false },
    CatalogueItem { name: "soup", category: ItemCategory::Food, base_price: 8, craftable: true },
    CatalogueItem { name: "shelf", category: ItemCategory::Material, base_price: 10, craftable: true },
    CatalogueItem { name: "wall", category: ItemCategory::Material, base_price: 15, craftable: true },
    CatalogueItem { name: "furniture", category: ItemCategory::Housing, base_price: 30, craftable: true },
    CatalogueItem { name: "house", category: ItemCategory::Housing, base_price: 100, craftable: true },
];

pub const RECIPES: &[Recipe] = &[
    Recipe {
        name: "soup",
        inputs: &[("potato", 2), ("onion", 1)],
        output: "soup",
        output_quantity: 1,
        ticks: 2,
        tier: 1,
    },
    Recipe {
        name: "shelf",
        inputs: &[("wood", 3), ("nails", 5)],
        output: "shelf",
        output_quantity: 1,
        ticks: 3,
        tier: 1,
    },
    Recipe {
        name: "wall",
        inputs: &[("stone", 5), ("wood", 3)],
        output: "wall",
        output_quantity: 1,
        ticks: 4,
        tier: 1,
    },
    Recipe {
        name: "furniture",
        inputs: &[("shelf", 2)],
        output: "furniture",
        output_quantity: 1,
        ticks: 3,
        tier: 2,
    },
    Recipe {
        name: "house",
        inputs: &[("wall", 4), ("furniture", 2)],
        output: "house",
        output_quantity: 1,
        ticks: 10,
        tier: 3,
    },
];

/// Per-tick base spawn quantities for raw materials.
pub const SPAWN_TABLE: &[(&str, u32)] = &[
    ("potato", 30),
    ("onion", 20),
    ("wood", 25),
    ("nails", 15),
    ("stone", 10),
];

pub fn item(name: &str) -> Option<&'static CatalogueItem> {
    ITEMS.iter().find(|i| i.name == name)
}

pub fn recipe(name: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.name == name)
}

pub fn is_valid_item(name: &str) -> bool {
    item(name).is_some()
}

pub fn raw_materials() -> impl Iterator<Item = &'static CatalogueItem> {
    ITEMS.iter().filter(|i| i.category == ItemCategory::Raw)
}

pub fn spawn_table() -> BTreeMap<String, u32> {
    SPAWN_TABLE
        .iter()
        .map(|(item, qty)| (item.to_string(), *qty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipes_reference_catalogue_items() {
        for r in RECIPES {
            assert!(is_valid_item(r.output), "unknown output {}", r.output);
            for (input, qty) in r.inputs {
                assert!(is_valid_item(input), "unknown input {}", input);
                assert!(*qty > 0);
            }
        }
    }

    #[test]
    fn test_spawn_table_covers_raw_materials() {
        let table = spawn_table();
        assert_eq!(table.len(), raw_materials().count());
        assert_eq!(table["potato"], 30);
        assert_eq!(table["onion"], 20);
        assert_eq!(table["wood"], 25);
        assert_eq!(table["nails"], 15);
        assert_eq!(table["stone"], 10);
    }

    #[test]
    fn test_recipe_constants() {
        let shelf = recipe("shelf").unwrap();
        assert_eq!(shelf.inputs_map()["wood"], 3);
        assert_eq!(shelf.inputs_map()["nails"], 5);
        assert_eq!(shelf.ticks, 3);
        assert_eq!(recipe("house").unwrap().ticks, 10);
        assert_eq!(recipe("furniture").unwrap().inputs_map()["shelf"], 2);
        assert!(recipe("potato").is_none());
    }

    #[test]
    fn test_raw_items_not_craftable() {
        assert!(raw_materials().all(|i| !i.craftable));
        assert!(item("house").unwrap().craftable);
    }
}
