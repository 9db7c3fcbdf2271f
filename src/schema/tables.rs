//! Domain tables written by the integration step

use super::types::*;

// =============================================================================
// Reference tables
// =============================================================================

pub static MONSTER_RACES: TableSchema = TableSchema {
    name: "monster_races",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("super_race_id", ColumnType::Integer),
    ],
    foreign_keys: &[],
};

// =============================================================================
// Creatures (base + specialized monster)
// =============================================================================

pub static CREATURES: TableSchema = TableSchema {
    name: "creatures",
    columns: &[
        Column::required("name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("life", ColumnType::Integer),
        Column::new("action_points", ColumnType::Integer),
        Column::new("movement_points", ColumnType::Integer),
        Column::new("strength", ColumnType::Integer),
        Column::new("intelligence", ColumnType::Integer),
        Column::new("chance", ColumnType::Integer),
        Column::new("agility", ColumnType::Integer),
        Column::new("wisdom", ColumnType::Integer),
        Column::new("resistances", ColumnType::Json),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

pub static MONSTERS: TableSchema = TableSchema {
    name: "monsters",
    columns: &[
        Column::required("creature_id", ColumnType::Integer).unique(),
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::new("race_id", ColumnType::Integer),
        Column::new("size", ColumnType::Text),
        Column::new("is_boss", ColumnType::Boolean),
        Column::new("is_mini_boss", ColumnType::Boolean),
        Column::new("auto_update", ColumnType::Boolean),
        Column::new("xp", ColumnType::Integer),
    ],
    foreign_keys: &[
        ForeignKey::new("creature_id", "creatures"),
        ForeignKey::new("race_id", "monster_races"),
    ],
};

// =============================================================================
// Spells and classes
// =============================================================================

pub static SPELLS: TableSchema = TableSchema {
    name: "spells",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("action_points", ColumnType::Integer),
        Column::new("range_min", ColumnType::Integer),
        Column::new("range_max", ColumnType::Integer),
        Column::new("casts_per_turn", ColumnType::Integer),
        Column::new("cooldown", ColumnType::Integer),
        Column::new("critical_rate", ColumnType::Real),
        Column::new("damage_formula", ColumnType::Text),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

pub static BREEDS: TableSchema = TableSchema {
    name: "breeds",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("short_name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("life_formula", ColumnType::Text),
        Column::new("complexity", ColumnType::Integer),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

// =============================================================================
// Items
// =============================================================================

pub static ITEMS: TableSchema = TableSchema {
    name: "items",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("type_id", ColumnType::Integer),
        Column::new("rarity", ColumnType::Integer),
        Column::new("price", ColumnType::Integer),
        Column::new("effects", ColumnType::Json),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

pub static CONSUMABLES: TableSchema = TableSchema {
    name: "consumables",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("type_id", ColumnType::Integer),
        Column::new("price", ColumnType::Integer),
        Column::new("effects", ColumnType::Json),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

pub static RESOURCES: TableSchema = TableSchema {
    name: "resources",
    columns: &[
        Column::new("dofusdb_id", ColumnType::Integer).unique(),
        Column::required("name", ColumnType::Text),
        Column::new("description", ColumnType::Text),
        Column::new("level", ColumnType::Integer),
        Column::new("type_id", ColumnType::Integer),
        Column::new("weight", ColumnType::Integer),
        Column::new("price", ColumnType::Integer),
        Column::new("image", ColumnType::Text),
    ],
    foreign_keys: &[],
};

// =============================================================================
// Table Registry
// =============================================================================

/// All tables, parents before children
pub static ALL_TABLES: &[&TableSchema] = &[
    &MONSTER_RACES,
    &CREATURES,
    &MONSTERS,
    &SPELLS,
    &BREEDS,
    &ITEMS,
    &CONSUMABLES,
    &RESOURCES,
];

/// Get a table schema by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().find(|t| t.name == name).copied()
}

/// Get all table names
pub fn table_names() -> Vec<&'static str> {
    ALL_TABLES.iter().map(|t| t.name).collect()
}
