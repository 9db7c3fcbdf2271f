//! Entity kinds and the tables that make up each entity group

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::tables::*;
use super::types::TableSchema;

/// Kinds of catalog entries this tool can collect and integrate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    MonsterRace,
    Monster,
    Spell,
    Class,
    Item,
    Consumable,
    Resource,
}

impl EntityKind {
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::MonsterRace,
        EntityKind::Monster,
        EntityKind::Spell,
        EntityKind::Class,
        EntityKind::Item,
        EntityKind::Consumable,
        EntityKind::Resource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::MonsterRace => "monster_race",
            EntityKind::Monster => "monster",
            EntityKind::Spell => "spell",
            EntityKind::Class => "class",
            EntityKind::Item => "item",
            EntityKind::Consumable => "consumable",
            EntityKind::Resource => "resource",
        }
    }

    /// Tables written together for this kind
    pub fn group(self) -> &'static EntityGroup {
        match self {
            EntityKind::MonsterRace => &MONSTER_RACE_GROUP,
            EntityKind::Monster => &MONSTER_GROUP,
            EntityKind::Spell => &SPELL_GROUP,
            EntityKind::Class => &CLASS_GROUP,
            EntityKind::Item => &ITEM_GROUP,
            EntityKind::Consumable => &CONSUMABLE_GROUP,
            EntityKind::Resource => &RESOURCE_GROUP,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// Sub-type table stored alongside the base row (one row per base row)
#[derive(Debug)]
pub struct Specialized {
    pub table: &'static TableSchema,
    /// Column holding the base row id
    pub link_column: &'static str,
}

/// A `table.column` pair
#[derive(Debug, Clone, Copy)]
pub struct ColumnRef {
    pub table: &'static str,
    pub column: &'static str,
}

/// A foreign key whose incoming value is an upstream identifier
#[derive(Debug)]
pub struct Reference {
    /// Where the upstream identifier arrives in the converted data
    pub source: ColumnRef,
    /// Table being referenced
    pub target: &'static str,
    /// Column of `target` holding the upstream identifier
    pub lookup_column: &'static str,
    /// Under `ignore_unvalidated`, an unresolved value skips the record
    pub required: bool,
}

/// The set of tables created or updated atomically for one entity
#[derive(Debug)]
pub struct EntityGroup {
    pub kind: EntityKind,
    pub base: &'static TableSchema,
    pub name_column: &'static str,
    pub specialized: Option<Specialized>,
    /// Upstream identifier, preferred over the name when matching rows
    pub external_id: ColumnRef,
    pub references: &'static [Reference],
}

impl EntityGroup {
    pub fn tables(&self) -> Vec<&'static TableSchema> {
        let mut tables = vec![self.base];
        if let Some(spec) = &self.specialized {
            tables.push(spec.table);
        }
        tables
    }

    pub fn owns_table(&self, name: &str) -> bool {
        self.tables().iter().any(|t| t.name == name)
    }
}

const fn simple_group(
    kind: EntityKind,
    table: &'static TableSchema,
    table_name: &'static str,
) -> EntityGroup {
    EntityGroup {
        kind,
        base: table,
        name_column: "name",
        specialized: None,
        external_id: ColumnRef {
            table: table_name,
            column: "dofusdb_id",
        },
        references: &[],
    }
}

pub static MONSTER_RACE_GROUP: EntityGroup =
    simple_group(EntityKind::MonsterRace, &MONSTER_RACES, "monster_races");

pub static MONSTER_GROUP: EntityGroup = EntityGroup {
    kind: EntityKind::Monster,
    base: &CREATURES,
    name_column: "name",
    specialized: Some(Specialized {
        table: &MONSTERS,
        link_column: "creature_id",
    }),
    external_id: ColumnRef {
        table: "monsters",
        column: "dofusdb_id",
    },
    references: &[Reference {
        source: ColumnRef {
            table: "monsters",
            column: "race_id",
        },
        target: "monster_races",
        lookup_column: "dofusdb_id",
        required: true,
    }],
};

pub static SPELL_GROUP: EntityGroup = simple_group(EntityKind::Spell, &SPELLS, "spells");
pub static CLASS_GROUP: EntityGroup = simple_group(EntityKind::Class, &BREEDS, "breeds");
pub static ITEM_GROUP: EntityGroup = simple_group(EntityKind::Item, &ITEMS, "items");
pub static CONSUMABLE_GROUP: EntityGroup =
    simple_group(EntityKind::Consumable, &CONSUMABLES, "consumables");
pub static RESOURCE_GROUP: EntityGroup =
    simple_group(EntityKind::Resource, &RESOURCES, "resources");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(*kind));
            assert_eq!(kind.group().kind, *kind);
        }
        assert!("dragon".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_group_columns_exist() {
        for kind in EntityKind::ALL {
            let group = kind.group();
            assert!(group.base.has_column(group.name_column));
            assert!(group.owns_table(group.external_id.table));
            if let Some(spec) = &group.specialized {
                assert!(spec.table.has_column(spec.link_column));
            }
            for reference in group.references {
                assert!(group.owns_table(reference.source.table));
                assert!(get_table(reference.target)
                    .is_some_and(|t| t.has_column(reference.lookup_column)));
            }
        }
    }
}
