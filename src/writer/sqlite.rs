use anyhow::{bail, Context, Result};
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql, Transaction};
use std::path::Path;
use tracing::{debug, info};

use super::schema_gen::{generate_create_table, generate_indexes};
use crate::convert::{Attributes, SqlValue};
use crate::schema::{get_table, TableSchema, ALL_TABLES};

/// The domain database
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `db_path` and make sure every table exists.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        info!(path = %db_path.display(), "opened database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.create_tables(ALL_TABLES)?;
        Ok(store)
    }

    /// Create the given tables if missing
    pub fn create_tables(&self, schemas: &[&TableSchema]) -> Result<()> {
        for schema in schemas {
            let sql = generate_create_table(schema);
            self.conn
                .execute(&sql, [])
                .with_context(|| format!("Failed to create table: {}", schema.name))?;

            for index_sql in generate_indexes(schema) {
                self.conn
                    .execute(&index_sql, [])
                    .with_context(|| format!("Failed to create index for: {}", schema.name))?;
            }
        }
        debug!(tables = schemas.len(), "schema ready");
        Ok(())
    }

    pub fn find_id(&self, table: &str, column: &str, value: &SqlValue) -> Result<Option<i64>> {
        find_id(&self.conn, table, column, value)
    }

    pub fn lookup(
        &self,
        table: &str,
        select: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<Option<SqlValue>> {
        lookup(&self.conn, table, select, column, value)
    }

    /// Every schema column of row `id`
    pub fn fetch_row(&self, table: &str, id: i64) -> Result<Option<Attributes>> {
        let schema = schema_for(table)?;
        let columns: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns.join(", "), table);

        self.conn
            .query_row(&sql, [id], |row| {
                let mut attrs = Attributes::new();
                for (idx, name) in columns.iter().enumerate() {
                    attrs.insert(name.to_string(), row.get::<_, SqlValue>(idx)?);
                }
                Ok(attrs)
            })
            .optional()
            .with_context(|| format!("Failed to read {} row {}", table, id))
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        schema_for(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Start an atomic batch of writes. Dropping it without `commit` rolls back.
    pub fn unit_of_work(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        Ok(UnitOfWork { tx })
    }
}

/// Writes that land together or not at all
pub struct UnitOfWork<'a> {
    tx: Transaction<'a>,
}

impl UnitOfWork<'_> {
    pub fn insert(&self, table: &str, attrs: &Attributes) -> Result<i64> {
        let schema = schema_for(table)?;
        check_columns(schema, attrs)?;

        if attrs.is_empty() {
            self.tx
                .execute(&format!("INSERT INTO {} DEFAULT VALUES", table), [])
                .with_context(|| format!("Failed to insert into {}", table))?;
        } else {
            let columns: Vec<&str> = attrs.keys().map(String::as_str).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            );
            self.tx
                .execute(&sql, params_from_iter(attrs.values()))
                .with_context(|| format!("Failed to insert into {}", table))?;
        }

        let id = self.tx.last_insert_rowid();
        debug!(table, id, "inserted");
        Ok(id)
    }

    pub fn update(&self, table: &str, id: i64, attrs: &Attributes) -> Result<()> {
        let updated = self.update_where(table, "id", &SqlValue::Integer(id), attrs)?;
        if updated == 0 && !attrs.is_empty() {
            bail!("No {} row with id {}", table, id);
        }
        Ok(())
    }

    /// Update every row of `table` whose `column` equals `value`
    pub fn update_where(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
        attrs: &Attributes,
    ) -> Result<usize> {
        let schema = schema_for(table)?;
        check_columns(schema, attrs)?;
        check_column(schema, column)?;
        if attrs.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = attrs
            .keys()
            .enumerate()
            .map(|(i, name)| format!("{} = ?{}", name, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            table,
            assignments.join(", "),
            column,
            attrs.len() + 1
        );

        let params: Vec<&dyn ToSql> = attrs
            .values()
            .map(|v| v as &dyn ToSql)
            .chain(std::iter::once(value as &dyn ToSql))
            .collect();
        let updated = self
            .tx
            .execute(&sql, params.as_slice())
            .with_context(|| format!("Failed to update {}", table))?;
        debug!(table, column, updated, "updated");
        Ok(updated)
    }

    pub fn find_id(&self, table: &str, column: &str, value: &SqlValue) -> Result<Option<i64>> {
        find_id(&self.tx, table, column, value)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("Failed to commit")
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback().context("Failed to roll back")
    }
}

fn schema_for(table: &str) -> Result<&'static TableSchema> {
    match get_table(table) {
        Some(schema) => Ok(schema),
        None => bail!("Unknown table: {}", table),
    }
}

fn check_column(schema: &TableSchema, column: &str) -> Result<()> {
    if column != "id" && !schema.has_column(column) {
        bail!("Unknown column {}.{}", schema.name, column);
    }
    Ok(())
}

fn check_columns(schema: &TableSchema, attrs: &Attributes) -> Result<()> {
    for column in attrs.keys() {
        if !schema.has_column(column) {
            bail!("Unknown column {}.{}", schema.name, column);
        }
    }
    Ok(())
}

fn lookup(
    conn: &Connection,
    table: &str,
    select: &str,
    column: &str,
    value: &SqlValue,
) -> Result<Option<SqlValue>> {
    let schema = schema_for(table)?;
    check_column(schema, select)?;
    check_column(schema, column)?;
    if value.is_null() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
        select, table, column
    );
    conn.query_row(&sql, [value], |row| row.get::<_, SqlValue>(0))
        .optional()
        .with_context(|| format!("Failed to query {}.{}", table, column))
}

fn find_id(conn: &Connection, table: &str, column: &str, value: &SqlValue) -> Result<Option<i64>> {
    Ok(lookup(conn, table, "id", column, value)?.and_then(|v| v.as_i64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn attrs(pairs: &[(&str, SqlValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_find_update() {
        let mut store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let id = uow
            .insert(
                "spells",
                &attrs(&[
                    ("dofusdb_id", SqlValue::Integer(12)),
                    ("name", SqlValue::Text("Pression".into())),
                ]),
            )
            .unwrap();
        uow.update("spells", id, &attrs(&[("level", SqlValue::Integer(3))]))
            .unwrap();
        uow.commit().unwrap();

        assert_eq!(
            store.find_id("spells", "dofusdb_id", &SqlValue::Integer(12)).unwrap(),
            Some(id)
        );
        let row = store.fetch_row("spells", id).unwrap().unwrap();
        assert_eq!(row["name"], SqlValue::Text("Pression".into()));
        assert_eq!(row["level"], SqlValue::Integer(3));
        assert_eq!(row["description"], SqlValue::Null);
    }

    #[test]
    fn test_dropped_unit_of_work_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let uow = store.unit_of_work().unwrap();
            uow.insert("monster_races", &attrs(&[("name", SqlValue::Text("Bouftous".into()))]))
                .unwrap();
        }
        assert_eq!(store.row_count("monster_races").unwrap(), 0);
    }

    #[test]
    fn test_unknown_table_or_column_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        assert!(uow.insert("users", &Attributes::new()).is_err());
        assert!(uow
            .insert("spells", &attrs(&[("name; DROP TABLE spells", SqlValue::Null)]))
            .is_err());
        drop(uow);
        assert!(store.row_count("sqlite_master").is_err());
    }

    #[test]
    fn test_not_null_violation_fails() {
        let mut store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        assert!(uow.insert("creatures", &attrs(&[("level", SqlValue::Integer(1))])).is_err());
    }

    #[test]
    fn test_open_keeps_existing_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        {
            let mut store = Store::open(&path).unwrap();
            let uow = store.unit_of_work().unwrap();
            uow.insert("items", &attrs(&[("name", SqlValue::Text("Amulette".into()))]))
                .unwrap();
            uow.commit().unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.row_count("items").unwrap(), 1);
        assert_eq!(
            store.find_id("items", "name", &SqlValue::Null).unwrap(),
            None
        );
    }
}
