use crate::schema::{ColumnType, TableSchema};

fn sql_type(col_type: ColumnType) -> &'static str {
    match col_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text => "TEXT",
        ColumnType::Boolean => "INTEGER",
        ColumnType::Json => "TEXT",
    }
}

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.name);
    let mut columns = vec!["    id INTEGER PRIMARY KEY".to_string()];

    for col in schema.columns {
        let null_constraint = if !col.nullable { " NOT NULL" } else { "" };
        let unique = if col.unique { " UNIQUE" } else { "" };
        columns.push(format!(
            "    {} {}{}{}",
            col.name,
            sql_type(col.col_type),
            null_constraint,
            unique
        ));
    }

    for fk in schema.foreign_keys {
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            fk.column, fk.references_table, fk.references_column
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    schema
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                schema.name, fk.column, schema.name, fk.column
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{CREATURES, MONSTERS};

    #[test]
    fn test_generate_create_table() {
        let sql = generate_create_table(&MONSTERS);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS monsters"));
        assert!(sql.contains("id INTEGER PRIMARY KEY"));
        assert!(sql.contains("creature_id INTEGER NOT NULL UNIQUE"));
        assert!(sql.contains("dofusdb_id INTEGER UNIQUE"));
        assert!(sql.contains("is_boss INTEGER"));
        assert!(sql.contains("FOREIGN KEY (race_id) REFERENCES monster_races(id)"));

        let sql = generate_create_table(&CREATURES);
        assert!(sql.contains("name TEXT NOT NULL"));
        assert!(sql.contains("resistances TEXT"));
    }

    #[test]
    fn test_generate_indexes() {
        let indexes = generate_indexes(&MONSTERS);
        assert!(indexes.iter().any(|i| i.contains("idx_monsters_race_id")));
        assert!(generate_indexes(&CREATURES).is_empty());
    }
}
