//! SQL statement loading keyed by (entity, operation).
//!
//! Statement text lives in `.sql` files, one per operation, under
//! `<sql_dir>/<entity>/<operation>.sql`. The loader caches what it reads and
//! falls back to statements embedded at compile time from the crate's own
//! `sql/` tree, so callers work without any on-disk layout. The store treats
//! the returned text as an opaque parameterized template.

use crate::error::{StoreError, StoreResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::debug;

/// Operations shipped for the `products` entity.
const PRODUCTS_BUILTIN: &[(&str, &str)] = &[
    ("schema", include_str!("../../sql/products/schema.sql")),
    ("create", include_str!("../../sql/products/create.sql")),
    ("find_by_id", include_str!("../../sql/products/find_by_id.sql")),
    ("find_all", include_str!("../../sql/products/find_all.sql")),
    ("update", include_str!("../../sql/products/update.sql")),
    ("delete", include_str!("../../sql/products/delete.sql")),
    ("count", include_str!("../../sql/products/count.sql")),
];

/// Loads and caches SQL statements.
///
/// Uses std::sync::RwLock (not tokio): loads are small synchronous file
/// reads and the lock is never held across an await.
pub struct StatementLoader {
    sql_dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, String>>,
}

impl StatementLoader {
    /// Create a loader reading from `sql_dir`, with embedded fallbacks.
    pub fn new(sql_dir: Option<PathBuf>) -> Self {
        Self {
            sql_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create a loader that serves only the embedded statements.
    pub fn builtin() -> Self {
        Self::new(None)
    }

    /// Load the statement for `entity`/`operation`, from cache when possible.
    pub fn load(&self, entity: &str, operation: &str) -> StoreResult<String> {
        let key = cache_key(entity, operation);
        {
            let cache = self.cache.read().unwrap();
            if let Some(sql) = cache.get(&key) {
                return Ok(sql.clone());
            }
        }

        let sql = self.read_statement(entity, operation)?;
        let mut cache = self.cache.write().unwrap();
        cache.insert(key, sql.clone());
        Ok(sql)
    }

    /// Force a reload from disk (or embedded fallback), bypassing the cache.
    pub fn reload(&self, entity: &str, operation: &str) -> StoreResult<String> {
        {
            let mut cache = self.cache.write().unwrap();
            cache.remove(&cache_key(entity, operation));
        }
        self.load(entity, operation)
    }

    /// Drop every cached statement.
    pub fn clear_cache(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Number of statements currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    fn read_statement(&self, entity: &str, operation: &str) -> StoreResult<String> {
        if let Some(dir) = &self.sql_dir {
            let path = dir.join(entity).join(format!("{}.sql", operation));
            if path.exists() {
                debug!(path = %path.display(), "loading statement from file");
                return std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .map_err(|e| {
                        StoreError::statement(
                            entity,
                            operation,
                            format!("error reading {}: {}", path.display(), e),
                        )
                    });
            }
        }

        builtin_statement(entity, operation)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                StoreError::statement(entity, operation, "no statement file and no embedded default")
            })
    }
}

impl std::fmt::Debug for StatementLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementLoader")
            .field("sql_dir", &self.sql_dir)
            .field("cached", &self.cached_count())
            .finish()
    }
}

fn cache_key(entity: &str, operation: &str) -> String {
    format!("{}.{}", entity, operation)
}

fn builtin_statement(entity: &str, operation: &str) -> Option<&'static str> {
    if entity != "products" {
        return None;
    }
    PRODUCTS_BUILTIN
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, sql)| *sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_builtin_statements_present() {
        let loader = StatementLoader::builtin();
        for op in [
            "schema",
            "create",
            "find_by_id",
            "find_all",
            "update",
            "delete",
            "count",
        ] {
            let sql = loader.load("products", op).unwrap();
            assert!(!sql.is_empty(), "empty statement for {}", op);
        }
        assert_eq!(loader.cached_count(), 7);
    }

    #[test]
    fn test_update_statement_is_conditional_on_version() {
        let loader = StatementLoader::builtin();
        let sql = loader.load("products", "update").unwrap();
        assert!(sql.contains("version = version + 1"));
        assert!(sql.contains("AND version = ?"));
    }

    #[test]
    fn test_unknown_statement_errors() {
        let loader = StatementLoader::builtin();
        let err = loader.load("products", "truncate").unwrap_err();
        assert!(matches!(err, StoreError::Statement { .. }));

        let err = loader.load("orders", "create").unwrap_err();
        assert!(matches!(err, StoreError::Statement { .. }));
    }

    #[test]
    fn test_file_overrides_builtin_and_reload_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let entity_dir = dir.path().join("products");
        fs::create_dir_all(&entity_dir).unwrap();
        let path = entity_dir.join("count.sql");
        fs::write(&path, "SELECT COUNT(id) FROM products\n").unwrap();

        let loader = StatementLoader::new(Some(dir.path().to_path_buf()));
        assert_eq!(
            loader.load("products", "count").unwrap(),
            "SELECT COUNT(id) FROM products"
        );

        // Cached: rewriting the file does not change the loaded text...
        fs::write(&path, "SELECT 42").unwrap();
        assert_eq!(
            loader.load("products", "count").unwrap(),
            "SELECT COUNT(id) FROM products"
        );

        // ...until reload bypasses the cache.
        assert_eq!(loader.reload("products", "count").unwrap(), "SELECT 42");
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let loader = StatementLoader::new(Some(dir.path().to_path_buf()));
        let sql = loader.load("products", "delete").unwrap();
        assert!(sql.starts_with("DELETE FROM products"));
    }

    #[test]
    fn test_clear_cache() {
        let loader = StatementLoader::builtin();
        loader.load("products", "count").unwrap();
        assert_eq!(loader.cached_count(), 1);
        loader.clear_cache();
        assert_eq!(loader.cached_count(), 0);
    }
}
