use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Manually supplied proxy values, keyed by group key label. Loaded in full
/// before each recompute; mutated only by discrete user actions, never by the
/// recompute itself.
pub struct OverrideStore {
    conn: Connection,
}

impl OverrideStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating overrides dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed opening overrides DB {}", path.display()))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed opening in-memory overrides DB")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS overrides (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL
            );
            ",
        )
        .context("Failed initializing overrides schema")?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<f64>> {
        self.conn
            .query_row("SELECT value FROM overrides WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed override lookup for {key}"))
    }

    /// Upserts one override. Non-finite values are rejected before any write,
    /// so a bad input leaves prior state intact.
    pub fn set(&self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            bail!("Override value for {key} must be a finite number, got {value}");
        }
        self.conn
            .execute(
                "
                INSERT INTO overrides (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                ",
                params![key, value],
            )
            .with_context(|| format!("Failed storing override for {key}"))?;
        Ok(())
    }

    /// Removes one override; returns whether an entry existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM overrides WHERE key = ?1", [key])
            .with_context(|| format!("Failed deleting override for {key}"))?;
        Ok(removed > 0)
    }

    /// Removes every override; returns how many were stored.
    pub fn clear_all(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM overrides", [])
            .context("Failed clearing overrides")
    }

    /// Loads the whole map for a recompute. BTreeMap so downstream iteration
    /// stays deterministic.
    pub fn load_all(&self) -> Result<BTreeMap<String, f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM overrides ORDER BY key")
            .context("Failed preparing overrides load")?;
        let mut rows = stmt.query([]).context("Failed querying overrides")?;
        let mut map = BTreeMap::new();
        while let Some(row) = rows.next().context("Failed iterating overrides")? {
            let key: String = row.get(0).context("Failed reading override key")?;
            let value: f64 = row.get(1).context("Failed reading override value")?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_round_trip() {
        let store = OverrideStore::open_in_memory().unwrap();
        let key = "Aetna | 99213 | 11 | NONE";
        assert_eq!(store.get(key).unwrap(), None);

        store.set(key, 45.0).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(45.0));

        store.set(key, 52.5).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(52.5));

        assert!(store.delete(key).unwrap());
        assert!(!store.delete(key).unwrap());
        assert_eq!(store.get(key).unwrap(), None);
    }

    #[test]
    fn non_finite_values_are_rejected_and_state_retained() {
        let store = OverrideStore::open_in_memory().unwrap();
        store.set("K", 10.0).unwrap();
        assert!(store.set("K", f64::NAN).is_err());
        assert!(store.set("K", f64::INFINITY).is_err());
        assert_eq!(store.get("K").unwrap(), Some(10.0));
    }

    #[test]
    fn clear_all_reports_removed_count() {
        let store = OverrideStore::open_in_memory().unwrap();
        store.set("A", 1.0).unwrap();
        store.set("B", 2.0).unwrap();
        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn load_all_returns_every_entry() {
        let store = OverrideStore::open_in_memory().unwrap();
        store.set("B", 2.0).unwrap();
        store.set("A", 1.0).unwrap();
        let map = store.load_all().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("A"), Some(&1.0));
        assert_eq!(map.get("B"), Some(&2.0));
    }
}
