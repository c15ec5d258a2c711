use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;
use crate::record::{index_value_int, index_value_text, index_value_type_tag, Filter, IndexValue, Record};

/// A durable, queryable store for [`Record`] types.
///
/// Every write is appended to a per-collection JSONL log under `root` before
/// the in-process SQLite projection is updated, so the log remains the
/// source of truth even if the SQLite file is lost or stale: [`Store::open`]
/// rebuilds nothing automatically, but [`Store::rebuild_indexes`] replays a
/// collection's log to reconstruct the projection from scratch.
pub struct Store {
    root: PathBuf,
    conn: Connection,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LogLine {
    id: String,
    #[serde(default)]
    tombstone: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Store {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let conn = Connection::open(root.join("index.db"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS record_index (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value_type TEXT NOT NULL,
                value_text TEXT,
                value_int INTEGER,
                PRIMARY KEY (collection, id, field)
            );
            CREATE INDEX IF NOT EXISTS record_index_lookup
                ON record_index (collection, field, value_text, value_int);",
        )?;
        debug!(root = %root.display(), "Store::open: ready");
        Ok(Self { root, conn })
    }

    fn log_path(collection: &str) -> String {
        format!("{collection}.jsonl")
    }

    fn append_log(&self, collection: &str, line: &LogLine) -> Result<(), StoreError> {
        let path = self.root.join(Self::log_path(collection));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let json = serde_json::to_string(line)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    fn write_projection<T: Record>(&mut self, record: &T) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let data = serde_json::to_string(record)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            (collection, record.id(), &data, record.updated_at()),
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            (collection, record.id()),
        )?;
        for (field, value) in record.indexed_fields() {
            tx.execute(
                "INSERT INTO record_index (collection, id, field, value_type, value_text, value_int)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    collection,
                    record.id(),
                    &field,
                    index_value_type_tag(&value),
                    index_value_text(&value),
                    index_value_int(&value),
                ),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1 AND id = ?2",
            (collection, id),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert a brand-new record. Fails with [`StoreError::Conflict`] if one
    /// with the same id already exists in this collection.
    pub fn create<T: Record>(&mut self, record: &T) -> Result<(), StoreError> {
        let collection = T::collection_name();
        if self.exists(collection, record.id())? {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: record.id().to_string(),
            });
        }
        self.append_log(
            collection,
            &LogLine {
                id: record.id().to_string(),
                tombstone: false,
                data: Some(serde_json::to_value(record)?),
            },
        )?;
        self.write_projection(record)?;
        debug!(collection, id = record.id(), "Store::create");
        Ok(())
    }

    /// Replace an existing record. Fails with [`StoreError::NotFound`] if no
    /// row exists yet — use [`Store::create`] first.
    pub fn update<T: Record>(&mut self, record: &T) -> Result<(), StoreError> {
        let collection = T::collection_name();
        if !self.exists(collection, record.id())? {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: record.id().to_string(),
            });
        }
        self.append_log(
            collection,
            &LogLine {
                id: record.id().to_string(),
                tombstone: false,
                data: Some(serde_json::to_value(record)?),
            },
        )?;
        self.write_projection(record)?;
        debug!(collection, id = record.id(), "Store::update");
        Ok(())
    }

    /// Fetch a single record by id.
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let collection = T::collection_name();
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                (collection, id),
                |row| row.get(0),
            )
            .ok();
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Delete a record by id. Deleting a record that does not exist is a
    /// no-op success (`Ok(false)`) — idempotent by design.
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<bool, StoreError> {
        let collection = T::collection_name();
        if !self.exists(collection, id)? {
            return Ok(false);
        }
        self.append_log(
            collection,
            &LogLine {
                id: id.to_string(),
                tombstone: true,
                data: None,
            },
        )?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            (collection, id),
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            (collection, id),
        )?;
        tx.commit()?;
        debug!(collection, id, "Store::delete");
        Ok(true)
    }

    /// Delete every record in `T`'s collection whose indexed `field` equals
    /// `value`. Returns the number of records removed. Idempotent: deleting
    /// from an already-empty match set succeeds with `0`.
    pub fn delete_by_index<T: Record>(&mut self, field: &str, value: &IndexValue) -> Result<usize, StoreError> {
        let matches: Vec<T> = self.list::<T>(&[Filter {
            field: field.to_string(),
            op: crate::record::FilterOp::Eq,
            value: value.clone(),
        }])?;
        let mut count = 0;
        for record in matches {
            if self.delete::<T>(record.id())? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// List every record in `T`'s collection matching all of `filters`
    /// (conjunction). An empty filter list returns the whole collection.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        let collection = T::collection_name();
        if filters.is_empty() {
            let mut stmt = self
                .conn
                .prepare("SELECT data FROM records WHERE collection = ?1")?;
            let rows = stmt.query_map((collection,), |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            return Ok(out);
        }

        let mut sql = String::from(
            "SELECT data FROM records WHERE collection = ?1 AND id IN (",
        );
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                sql.push_str(" INTERSECT ");
            }
            let (op, column, _) = filter.sql_fragment();
            sql.push_str(&format!(
                "SELECT id FROM record_index WHERE collection = ?1 AND field = ?{} AND {} {} ?{}",
                2 + i * 2,
                column,
                op,
                3 + i * 2
            ));
        }
        sql.push(')');

        let mut stmt = self.conn.prepare(&sql)?;
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(collection.to_string())];
        for filter in filters {
            let (_, _, value) = filter.sql_fragment();
            params.push(Box::new(filter.field.clone()));
            params.push(Box::new(value));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Replay `T`'s JSONL log from scratch into the SQLite projection.
    ///
    /// Called at startup so the projection reflects reality even if the
    /// SQLite file was deleted, corrupted, or simply never existed — the
    /// JSONL log is the durable source of truth.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let tx_clear = self.conn.transaction()?;
        tx_clear.execute("DELETE FROM records WHERE collection = ?1", (collection,))?;
        tx_clear.execute(
            "DELETE FROM record_index WHERE collection = ?1",
            (collection,),
        )?;
        tx_clear.commit()?;

        let path = self.root.join(Self::log_path(collection));
        if !path.exists() {
            debug!(collection, "Store::rebuild_indexes: no log yet");
            return Ok(());
        }

        let mut latest: HashMap<String, Option<T>> = HashMap::new();
        let file = std::fs::File::open(&path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: LogLine = serde_json::from_str(&line)?;
            if parsed.tombstone {
                latest.insert(parsed.id, None);
            } else if let Some(data) = parsed.data {
                let record: T = serde_json::from_value(data)?;
                latest.insert(parsed.id, Some(record));
            }
        }

        for record in latest.into_values().flatten() {
            self.write_projection(&record)?;
        }
        debug!(collection, "Store::rebuild_indexes: replayed log");
        Ok(())
    }

    /// Checkpoint the SQLite WAL. The JSONL logs are already fsync'd per
    /// write via [`Store::append_log`]; this only flushes the query
    /// projection.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::now_ms;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        status: String,
        count: i64,
        updated_at: i64,
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> i64 {
            self.updated_at
        }
        fn collection_name() -> &'static str {
            "widgets"
        }
        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            let mut m = HashMap::new();
            m.insert("status".to_string(), IndexValue::String(self.status.clone()));
            m.insert("count".to_string(), IndexValue::Int(self.count));
            m
        }
    }

    fn widget(id: &str, status: &str, count: i64) -> Widget {
        Widget {
            id: id.to_string(),
            status: status.to_string(),
            count,
            updated_at: now_ms(),
        }
    }

    #[test]
    fn create_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let w = widget("a", "pending", 1);
        store.create(&w).unwrap();
        let fetched: Widget = store.get("a").unwrap().unwrap();
        assert_eq!(fetched, w);
    }

    #[test]
    fn create_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.create(&widget("a", "pending", 1)).unwrap();
        let err = store.create(&widget("a", "pending", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn update_missing_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let err = store.update(&widget("missing", "pending", 1)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_missing_is_idempotent_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        assert!(!store.delete::<Widget>("nope").unwrap());
        store.create(&widget("a", "pending", 1)).unwrap();
        assert!(store.delete::<Widget>("a").unwrap());
        assert!(!store.delete::<Widget>("a").unwrap());
    }

    #[test]
    fn list_filters_by_indexed_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.create(&widget("a", "pending", 1)).unwrap();
        store.create(&widget("b", "running", 2)).unwrap();
        store.create(&widget("c", "pending", 3)).unwrap();

        let pending: Vec<Widget> = store
            .list(&[Filter::eq("status", IndexValue::String("pending".into()))])
            .unwrap();
        assert_eq!(pending.len(), 2);

        let combined: Vec<Widget> = store
            .list(&[
                Filter::eq("status", IndexValue::String("pending".into())),
                Filter::eq("count", IndexValue::Int(3)),
            ])
            .unwrap();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].id, "c");
    }

    #[test]
    fn delete_by_index_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.create(&widget("a", "pending", 1)).unwrap();
        store.create(&widget("b", "pending", 2)).unwrap();
        store.create(&widget("c", "running", 3)).unwrap();

        let removed = store
            .delete_by_index::<Widget>("status", &IndexValue::String("pending".into()))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list::<Widget>(&[]).unwrap().len(), 1);
    }

    #[test]
    fn rebuild_indexes_replays_log_after_projection_loss() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.create(&widget("a", "pending", 1)).unwrap();
            store.create(&widget("b", "pending", 2)).unwrap();
            let mut b_gone = widget("b", "pending", 2);
            b_gone.status = "running".into();
            store.update(&b_gone).unwrap();
            store.delete::<Widget>("a").unwrap();
        }
        // Simulate SQLite projection loss; JSONL log is untouched.
        std::fs::remove_file(dir.path().join("index.db")).unwrap();

        let mut store = Store::open(dir.path()).unwrap();
        store.rebuild_indexes::<Widget>().unwrap();
        let all: Vec<Widget> = store.list(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "b");
        assert_eq!(all[0].status, "running");
    }
}
