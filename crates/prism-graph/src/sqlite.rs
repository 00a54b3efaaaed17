//! SQLite-backed graph store.
//!
//! Documents, entities, and edges live in plain tables; the keyword index is
//! an FTS5 virtual table over entity id + property values using the porter
//! tokenizer, so "mountains" in a query matches a "mountain" entity. The
//! connection is wrapped in a Mutex since rusqlite's Connection is not Sync.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info};

use prism_core::error::{PrismError, Result};
use prism_core::types::{Document, GraphEdge, GraphNode, KEYWORD_INDEX};

use crate::store::{DocumentHit, GraphStore};

/// Graph store adapter over an embedded SQLite database.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a graph database at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| PrismError::StoreUnavailable(format!("open graph db: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| PrismError::Storage(format!("set pragmas: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(init_schema)?;
        info!("Graph store opened at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory graph database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PrismError::StoreUnavailable(format!("open in-memory graph db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| PrismError::Storage(format!("set pragmas: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(init_schema)?;
        Ok(store)
    }

    /// Execute a closure with the underlying connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PrismError::Storage(format!("graph db lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Row counts (documents, nodes, edges). Used by coverage checks and tests.
    pub fn counts(&self) -> Result<(u64, u64, u64)> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(|e| PrismError::Storage(format!("count {}: {}", table, e)))
            };
            Ok((count("documents")?, count("nodes")?, count("edges")?))
        })
    }
}

/// Initial schema: documents, nodes, edges, and the keyword index.
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            filename    TEXT PRIMARY KEY NOT NULL,
            text        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
            id              TEXT PRIMARY KEY NOT NULL,
            node_type       TEXT NOT NULL,
            properties      TEXT NOT NULL DEFAULT '{}',
            source_filename TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_source
            ON nodes (source_filename);

        CREATE TABLE IF NOT EXISTS edges (
            edge_type   TEXT NOT NULL,
            from_id     TEXT NOT NULL,
            to_id       TEXT NOT NULL,
            properties  TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (edge_type, from_id, to_id)
        );

        CREATE INDEX IF NOT EXISTS idx_edges_to
            ON edges (to_id);",
    )
    .map_err(|e| PrismError::Storage(format!("create graph schema: {}", e)))?;

    ensure_keyword_index(conn)
}

/// (Re)create the FTS5 keyword index if a reset dropped it.
fn ensure_keyword_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
            node_id UNINDEXED,
            content,
            tokenize = 'porter unicode61'
        );",
        KEYWORD_INDEX
    ))
    .map_err(|e| PrismError::Storage(format!("create keyword index: {}", e)))
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .map_err(|e| PrismError::Storage(format!("check table {}: {}", name, e)))
}

/// Turn a natural-language query into an FTS5 MATCH expression: quoted terms
/// joined with OR. Returns None when no searchable term remains.
fn build_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Text indexed for one node: its surface id plus all property values.
fn keyword_content(node: &GraphNode) -> String {
    let mut content = node.id.clone();
    for value in node.properties.values() {
        content.push(' ');
        content.push_str(value);
    }
    content
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn wipe_all(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("DELETE FROM edges; DELETE FROM nodes; DELETE FROM documents;")
                .map_err(|e| PrismError::Storage(format!("wipe graph store: {}", e)))?;
            if table_exists(conn, KEYWORD_INDEX)? {
                conn.execute(&format!("DELETE FROM {}", KEYWORD_INDEX), [])
                    .map_err(|e| PrismError::Storage(format!("wipe keyword index: {}", e)))?;
            }
            Ok(())
        })?;
        info!("Graph store wiped");
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            if name != KEYWORD_INDEX || !table_exists(conn, name)? {
                return Err(PrismError::IndexMissing(name.to_string()));
            }
            conn.execute_batch(&format!("DROP TABLE {}", KEYWORD_INDEX))
                .map_err(|e| PrismError::Storage(format!("drop keyword index: {}", e)))?;
            debug!(index = name, "Keyword index dropped");
            Ok(())
        })
    }

    async fn upsert(
        &self,
        documents: &[Document],
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<()> {
        self.with_conn(|conn| {
            ensure_keyword_index(conn)?;

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| PrismError::Storage(format!("begin upsert: {}", e)))?;

            for doc in documents {
                tx.execute(
                    "INSERT INTO documents (filename, text) VALUES (?1, ?2)
                     ON CONFLICT(filename) DO UPDATE SET text = excluded.text",
                    rusqlite::params![doc.filename, doc.text],
                )
                .map_err(|e| PrismError::Storage(format!("upsert document: {}", e)))?;
            }

            for node in nodes {
                let properties = serde_json::to_string(&node.properties)?;
                tx.execute(
                    "INSERT OR REPLACE INTO nodes (id, node_type, properties, source_filename)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![node.id, node.node_type, properties, node.source],
                )
                .map_err(|e| PrismError::Storage(format!("upsert node: {}", e)))?;

                // Keep the keyword index in step with the node row.
                tx.execute(
                    &format!("DELETE FROM {} WHERE node_id = ?1", KEYWORD_INDEX),
                    rusqlite::params![node.id],
                )
                .map_err(|e| PrismError::Storage(format!("reindex node: {}", e)))?;
                tx.execute(
                    &format!(
                        "INSERT INTO {} (node_id, content) VALUES (?1, ?2)",
                        KEYWORD_INDEX
                    ),
                    rusqlite::params![node.id, keyword_content(node)],
                )
                .map_err(|e| PrismError::Storage(format!("index node keywords: {}", e)))?;
            }

            for edge in edges {
                let properties = serde_json::to_string(&edge.properties)?;
                tx.execute(
                    "INSERT OR REPLACE INTO edges (edge_type, from_id, to_id, properties)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![edge.edge_type, edge.from, edge.to, properties],
                )
                .map_err(|e| PrismError::Storage(format!("upsert edge: {}", e)))?;
            }

            tx.commit()
                .map_err(|e| PrismError::Storage(format!("commit upsert: {}", e)))?;

            debug!(
                documents = documents.len(),
                nodes = nodes.len(),
                edges = edges.len(),
                "Graph batch upserted"
            );
            Ok(())
        })
    }

    async fn fulltext_query(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocumentHit>> {
        if index != KEYWORD_INDEX {
            debug!(index, "Unknown keyword index queried; returning no hits");
            return Ok(Vec::new());
        }
        let Some(match_expr) = build_match_expr(query) else {
            return Ok(Vec::new());
        };

        self.with_conn(|conn| {
            // Between a reset's drop and the rebuild's recreate the index does
            // not exist; that window reads as empty, not as an error.
            if !table_exists(conn, KEYWORD_INDEX)? {
                debug!("Keyword index absent (rebuild window); returning no hits");
                return Ok(Vec::new());
            }

            let sql = format!(
                "SELECT d.filename, d.text, COUNT(*) AS matched_entities
                 FROM {idx}
                 JOIN nodes n ON n.id = {idx}.node_id
                 JOIN edges e ON e.edge_type = 'MENTIONS' AND e.to_id = n.id
                 JOIN documents d ON d.filename = e.from_id
                 WHERE {idx} MATCH ?1
                 GROUP BY d.filename
                 ORDER BY matched_entities DESC, d.filename ASC
                 LIMIT ?2",
                idx = KEYWORD_INDEX
            );

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| PrismError::Storage(format!("prepare keyword query: {}", e)))?;

            let rows = stmt
                .query_map(rusqlite::params![match_expr, limit as i64], |row| {
                    Ok(DocumentHit {
                        filename: row.get(0)?,
                        text: row.get(1)?,
                    })
                })
                .map_err(|e| PrismError::Storage(format!("keyword query: {}", e)))?;

            let mut hits = Vec::new();
            for row in rows {
                hits.push(row.map_err(|e| PrismError::Storage(e.to_string()))?);
            }
            Ok(hits)
        })
    }

    async fn document_filenames(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT filename FROM documents ORDER BY filename")
                .map_err(|e| PrismError::Storage(format!("prepare filenames: {}", e)))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| PrismError::Storage(format!("list filenames: {}", e)))?;
            let mut filenames = Vec::new();
            for row in rows {
                filenames.push(row.map_err(|e| PrismError::Storage(e.to_string()))?);
            }
            Ok(filenames)
        })
    }

    async fn connected(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| PrismError::Storage(e.to_string()))
        })
        .is_ok()
    }
}

impl std::fmt::Debug for SqliteGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphStore").finish()
    }
}
