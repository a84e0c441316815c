//! Knowledge Store Implementation
//!
//! SQLite-backed persistence for holons, evidence, relations, waivers and
//! the bookkeeping tables (audit log, work records).
//! Location: `<project>/.assay/assay.db`
//!
//! Pure data access. Policy (scoring, promotion, phase legality) lives in
//! the reliability engine, the phase machine and the tool façade.

use super::schema::{
    Dependency, Evidence, Holon, HolonKind, HolonType, Layer, NewEvidence, NewHolon, Relation,
    RelationOutcome, RelationType, StaleEvidence, Waiver, WaiverReport, DEFAULT_CONGRUENCE_LEVEL,
    SCHEMA_VERSION,
};
use crate::audit_log::AuditEntry;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Knowledge store backed by SQLite
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl KnowledgeStore {
    /// Open or create the knowledge store at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let conn =
            Connection::open(path).with_context(|| format!("Failed to open database: {:?}", path))?;

        // Single writer, readers alongside
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("knowledge store connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS holons (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                kind TEXT,
                layer TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                context_id TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT '',
                parent_id TEXT,
                cached_r_score REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS evidence (
                id TEXT PRIMARY KEY,
                holon_id TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                verdict TEXT NOT NULL,
                assurance_level TEXT,
                carrier_ref TEXT,
                valid_until TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS relations (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relation_type TEXT NOT NULL,
                congruence_level INTEGER DEFAULT 3,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, relation_type)
            );

            CREATE TABLE IF NOT EXISTS waivers (
                id TEXT PRIMARY KEY,
                evidence_id TEXT NOT NULL,
                waived_by TEXT NOT NULL,
                waived_until TEXT NOT NULL,
                rationale TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                tool_name TEXT NOT NULL,
                operation TEXT NOT NULL,
                actor TEXT NOT NULL,
                target_id TEXT,
                input_hash TEXT,
                result TEXT NOT NULL,
                details TEXT,
                context_id TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_records (
                id TEXT PRIMARY KEY,
                method_name TEXT NOT NULL,
                performer TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                resource_ledger TEXT
            );

            CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_holons_context_layer ON holons(context_id, layer);
            CREATE INDEX IF NOT EXISTS idx_holons_updated ON holons(updated_at);
            CREATE INDEX IF NOT EXISTS idx_evidence_holon ON evidence(holon_id);
            CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id, relation_type);
            CREATE INDEX IF NOT EXISTS idx_waivers_evidence ON waivers(evidence_id);
            "#,
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Holons
    // ------------------------------------------------------------------

    /// Insert a new holon. Fails if the id already exists.
    pub fn create_holon(&self, holon: &NewHolon) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO holons (id, type, kind, layer, title, content, context_id, scope, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &holon.id,
                holon.holon_type.as_str(),
                holon.kind.map(|k| k.as_str()),
                holon.layer.as_str(),
                &holon.title,
                &holon.content,
                &holon.context_id,
                &holon.scope,
                &holon.parent_id,
                now,
                now
            ],
        )
        .with_context(|| format!("Failed to create holon {}", holon.id))?;
        debug!(holon = %holon.id, layer = %holon.layer, "holon created");
        Ok(())
    }

    /// Get a holon by id
    pub fn get_holon(&self, id: &str) -> Result<Option<Holon>> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT id, type, kind, layer, title, content, context_id, scope, parent_id,
                   cached_r_score, created_at, updated_at
            FROM holons WHERE id = ?
            "#,
            params![id],
            Self::row_to_holon,
        )
        .optional()
        .with_context(|| format!("Failed to load holon {}", id))
    }

    /// Title of a holon, if it exists
    pub fn get_holon_title(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT title FROM holons WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Move a holon to a new layer; bumps `updated_at`
    pub fn update_holon_layer(&self, id: &str, layer: Layer) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE holons SET layer = ?, updated_at = ? WHERE id = ?",
            params![layer.as_str(), Utc::now(), id],
        )?;
        if changed == 0 {
            bail!("holon not found: {}", id);
        }
        Ok(())
    }

    /// Write the cached reliability column
    pub fn update_cached_score(&self, id: &str, score: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE holons SET cached_r_score = ? WHERE id = ?",
            params![score, id],
        )?;
        Ok(())
    }

    /// Every holon id, sorted
    pub fn list_holon_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM holons ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Holon count per layer within a bounded context
    pub fn count_holons_by_layer(&self, context_id: &str) -> Result<HashMap<String, i64>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT layer, COUNT(*) FROM holons WHERE context_id = ? GROUP BY layer")?;
        let rows = stmt.query_map(params![context_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (layer, count) = row?;
            counts.insert(layer, count);
        }
        Ok(counts)
    }

    /// Layer of the most recently updated holon in a context
    pub fn latest_holon_layer(&self, context_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT layer FROM holons WHERE context_id = ? ORDER BY updated_at DESC, rowid DESC LIMIT 1",
                params![context_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn row_to_holon(row: &Row<'_>) -> rusqlite::Result<Holon> {
        let kind: Option<String> = row.get(2)?;
        let layer: String = row.get(3)?;
        Ok(Holon {
            id: row.get(0)?,
            holon_type: HolonType::parse(&row.get::<_, String>(1)?),
            kind: kind.as_deref().and_then(HolonKind::parse),
            layer: Layer::parse(&layer).unwrap_or(Layer::L0),
            title: row.get(4)?,
            content: row.get(5)?,
            context_id: row.get(6)?,
            scope: row.get(7)?,
            parent_id: row.get(8)?,
            cached_reliability: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    // ------------------------------------------------------------------
    // Evidence
    // ------------------------------------------------------------------

    /// Append an evidence record
    pub fn add_evidence(&self, evidence: &NewEvidence) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO evidence (id, holon_id, type, content, verdict, assurance_level, carrier_ref, valid_until, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &evidence.id,
                &evidence.holon_id,
                &evidence.evidence_type,
                &evidence.content,
                evidence.verdict.to_ascii_lowercase(),
                &evidence.assurance_level,
                &evidence.carrier_ref,
                &evidence.valid_until,
                Utc::now()
            ],
        )
        .with_context(|| format!("Failed to add evidence {}", evidence.id))?;
        Ok(())
    }

    /// All evidence for a holon, oldest first
    pub fn get_evidence(&self, holon_id: &str) -> Result<Vec<Evidence>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, holon_id, type, content, verdict, assurance_level, carrier_ref, valid_until, created_at
            FROM evidence WHERE holon_id = ? ORDER BY created_at, rowid
            "#,
        )?;
        let rows = stmt
            .query_map(params![holon_id], Self::row_to_evidence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Single evidence record by id
    pub fn get_evidence_by_id(&self, id: &str) -> Result<Option<Evidence>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                r#"
                SELECT id, holon_id, type, content, verdict, assurance_level, carrier_ref, valid_until, created_at
                FROM evidence WHERE id = ?
                "#,
                params![id],
                Self::row_to_evidence,
            )
            .optional()?)
    }

    fn row_to_evidence(row: &Row<'_>) -> rusqlite::Result<Evidence> {
        Ok(Evidence {
            id: row.get(0)?,
            holon_id: row.get(1)?,
            evidence_type: row.get(2)?,
            content: row.get(3)?,
            verdict: row.get(4)?,
            assurance_level: row.get(5)?,
            carrier_ref: row.get(6)?,
            valid_until: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Create a typed edge.
    ///
    /// Propagating edges that would close a cycle are skipped (no row is
    /// written) and reported as `RelationOutcome::SkippedCycle`. A self
    /// reference is an error. Re-inserting an existing triple is a no-op.
    pub fn create_relation(
        &self,
        source_id: &str,
        relation_type: RelationType,
        target_id: &str,
        congruence_level: i64,
    ) -> Result<RelationOutcome> {
        if source_id == target_id {
            bail!("holon cannot relate to itself: {}", source_id);
        }

        if relation_type.propagates() {
            let (dependent, dependency) = if relation_type.source_is_dependent() {
                (source_id, target_id)
            } else {
                (target_id, source_id)
            };
            if self.would_create_cycle(dependent, dependency)? {
                warn!(
                    source = source_id,
                    target = target_id,
                    relation = relation_type.as_str(),
                    "relation would create a cycle, skipping"
                );
                return Ok(RelationOutcome::SkippedCycle);
            }
        }

        self.link(source_id, relation_type, target_id, Some(congruence_level))?;
        Ok(RelationOutcome::Created)
    }

    /// Raw, unguarded edge insert (idempotent on the composite key)
    pub fn link(
        &self,
        source_id: &str,
        relation_type: RelationType,
        target_id: &str,
        congruence_level: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO relations (source_id, target_id, relation_type, congruence_level, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                source_id,
                target_id,
                relation_type.as_str(),
                congruence_level.unwrap_or(DEFAULT_CONGRUENCE_LEVEL),
                Utc::now()
            ],
        )
        .with_context(|| {
            format!(
                "Failed to link {} -{}-> {}",
                source_id,
                relation_type.as_str(),
                target_id
            )
        })?;
        Ok(())
    }

    /// Whether adding "dependent needs dependency" would close a cycle,
    /// i.e. whether `dependent` is already reachable from `dependency`.
    pub fn would_create_cycle(&self, dependent: &str, dependency: &str) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut worklist = vec![dependency.to_string()];

        while let Some(current) = worklist.pop() {
            if current == dependent {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies_of(&current)? {
                if !visited.contains(&dep.holon_id) {
                    worklist.push(dep.holon_id);
                }
            }
        }
        Ok(false)
    }

    /// Holons this holon needs, across propagating edges.
    ///
    /// componentOf/constituentOf rows where the holon is the whole yield the
    /// part; dependsOn rows where the holon is the dependent yield the
    /// dependency.
    pub fn dependencies_of(&self, holon_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT source_id AS dep_id, congruence_level FROM relations
            WHERE target_id = ?1 AND relation_type IN ('componentOf', 'constituentOf')
            UNION
            SELECT target_id AS dep_id, congruence_level FROM relations
            WHERE source_id = ?1 AND relation_type = 'dependsOn'
            ORDER BY dep_id
            "#,
        )?;
        let deps = stmt
            .query_map(params![holon_id], |row| {
                Ok(Dependency {
                    holon_id: row.get(0)?,
                    congruence_level: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Structural parts of a whole (componentOf/constituentOf sources)
    pub fn components_of(&self, holon_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, congruence_level FROM relations
            WHERE target_id = ? AND relation_type IN ('componentOf', 'constituentOf')
            ORDER BY source_id
            "#,
        )?;
        let parts = stmt
            .query_map(params![holon_id], |row| {
                Ok(Dependency {
                    holon_id: row.get(0)?,
                    congruence_level: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    /// Alternatives grouped under a decision context (memberOf sources)
    pub fn members_of(&self, holon_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id FROM relations WHERE target_id = ? AND relation_type = 'memberOf' ORDER BY source_id",
        )?;
        let ids = stmt
            .query_map(params![holon_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Outgoing edges of a holon, any type
    pub fn relations_from(&self, source_id: &str) -> Result<Vec<Relation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, relation_type, congruence_level FROM relations WHERE source_id = ? ORDER BY target_id, relation_type",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut relations = Vec::new();
        for row in rows {
            let (source_id, target_id, kind, congruence_level) = row?;
            match RelationType::parse(&kind) {
                Some(relation_type) => relations.push(Relation {
                    source_id,
                    target_id,
                    relation_type,
                    congruence_level,
                }),
                None => warn!(relation = %kind, "unknown relation type in store, ignoring"),
            }
        }
        Ok(relations)
    }

    // ------------------------------------------------------------------
    // Waivers
    // ------------------------------------------------------------------

    /// Record a waiver for an evidence record
    pub fn create_waiver(&self, waiver: &Waiver) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO waivers (id, evidence_id, waived_by, waived_until, rationale, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                &waiver.id,
                &waiver.evidence_id,
                &waiver.waived_by,
                waiver.waived_until,
                &waiver.rationale,
                Utc::now()
            ],
        )
        .with_context(|| format!("Failed to create waiver for {}", waiver.evidence_id))?;
        Ok(())
    }

    /// Latest waiver horizon for an evidence record, if it is still in the future
    pub fn active_waiver_until(
        &self,
        evidence_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let latest: Option<DateTime<Utc>> = conn.query_row(
            "SELECT MAX(waived_until) FROM waivers WHERE evidence_id = ?",
            params![evidence_id],
            |row| row.get(0),
        )?;
        Ok(latest.filter(|until| *until > now))
    }

    /// Expired evidence with no active waiver, grouped by holon id
    pub fn stale_evidence(&self, now: DateTime<Utc>) -> Result<Vec<StaleEvidence>> {
        let candidates = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT e.id, e.holon_id, h.title, h.layer, e.type, e.valid_until
                FROM evidence e
                JOIN holons h ON e.holon_id = h.id
                WHERE e.valid_until IS NOT NULL
                ORDER BY h.id, e.valid_until
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, DateTime<Utc>>(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut stale = Vec::new();
        for (evidence_id, holon_id, holon_title, holon_layer, evidence_type, valid_until) in
            candidates
        {
            if valid_until >= now {
                continue;
            }
            if self.active_waiver_until(&evidence_id, now)?.is_some() {
                continue;
            }
            stale.push(StaleEvidence {
                evidence_id,
                holon_id,
                holon_title,
                holon_layer,
                evidence_type,
                days_overdue: (now - valid_until).num_days(),
            });
        }

        stale.sort_by(|a, b| {
            a.holon_id
                .cmp(&b.holon_id)
                .then(b.days_overdue.cmp(&a.days_overdue))
        });
        Ok(stale)
    }

    /// Waivers still in force, soonest expiry first
    pub fn active_waivers(&self, now: DateTime<Utc>) -> Result<Vec<WaiverReport>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT w.evidence_id, e.holon_id, h.title, w.waived_until, w.waived_by, w.rationale
            FROM waivers w
            JOIN evidence e ON w.evidence_id = e.id
            JOIN holons h ON e.holon_id = h.id
            ORDER BY w.waived_until ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WaiverReport {
                    evidence_id: row.get(0)?,
                    holon_id: row.get(1)?,
                    holon_title: row.get(2)?,
                    waived_until: row.get(3)?,
                    waived_by: row.get(4)?,
                    rationale: row.get(5)?,
                    days_until_expiry: 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|w| w.waived_until > now)
            .map(|mut w| {
                w.days_until_expiry = (w.waived_until - now).num_days();
                w
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    /// Append an audit-log row
    pub fn insert_audit_log(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO audit_log (id, tool_name, operation, actor, target_id, input_hash, result, details, context_id, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &entry.id,
                &entry.tool_name,
                &entry.operation,
                &entry.actor,
                &entry.target_id,
                &entry.input_hash,
                entry.result.as_str(),
                &entry.details,
                &entry.context_id,
                entry.timestamp
            ],
        )?;
        Ok(())
    }

    /// Audit rows for a target, oldest first
    pub fn audit_entries_for(&self, target_id: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT operation, result FROM audit_log WHERE target_id = ? ORDER BY timestamp, rowid",
        )?;
        let rows = stmt
            .query_map(params![target_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Append a work record
    pub fn record_work(
        &self,
        id: &str,
        method_name: &str,
        performer: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        resource_ledger: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO work_records (id, method_name, performer, started_at, ended_at, resource_ledger)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![id, method_name, performer, started_at, ended_at, resource_ledger],
        )?;
        Ok(())
    }

    /// Number of work records for a method
    pub fn count_work_records(&self, method_name: &str) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM work_records WHERE method_name = ?",
            params![method_name],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn test_store() -> (KnowledgeStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_assay.db");
        let store = KnowledgeStore::open(&path).unwrap();
        (store, dir)
    }

    fn holon(store: &KnowledgeStore, id: &str) {
        store
            .create_holon(&NewHolon::hypothesis(
                id,
                HolonKind::System,
                id,
                "content",
                "global",
                "default",
            ))
            .unwrap();
    }

    #[test]
    fn test_create_and_get_holon() {
        let (store, _dir) = test_store();
        holon(&store, "redis-cache");

        let h = store.get_holon("redis-cache").unwrap().unwrap();
        assert_eq!(h.layer, Layer::L0);
        assert_eq!(h.kind, Some(HolonKind::System));
        assert_eq!(h.cached_reliability, 0.0);
        assert!(store.get_holon("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_holon_is_error() {
        let (store, _dir) = test_store();
        holon(&store, "a");
        let again = NewHolon::hypothesis("a", HolonKind::System, "a", "c", "", "default");
        assert!(store.create_holon(&again).is_err());
    }

    #[test]
    fn test_update_layer_and_latest() {
        let (store, _dir) = test_store();
        holon(&store, "a");
        holon(&store, "b");
        store.update_holon_layer("a", Layer::L1).unwrap();

        assert_eq!(
            store.latest_holon_layer("default").unwrap().as_deref(),
            Some("L1")
        );
        let counts = store.count_holons_by_layer("default").unwrap();
        assert_eq!(counts.get("L0"), Some(&1));
        assert_eq!(counts.get("L1"), Some(&1));
        assert!(store.update_holon_layer("nope", Layer::L1).is_err());
    }

    #[test]
    fn test_self_reference_is_error() {
        let (store, _dir) = test_store();
        holon(&store, "a");
        assert!(store
            .create_relation("a", RelationType::ComponentOf, "a", 3)
            .is_err());
    }

    #[test]
    fn test_cycle_edge_skipped_and_reverse_allowed() {
        let (store, _dir) = test_store();
        holon(&store, "part");
        holon(&store, "whole");

        let first = store
            .create_relation("part", RelationType::ComponentOf, "whole", 3)
            .unwrap();
        assert_eq!(first, RelationOutcome::Created);

        let back = store
            .create_relation("whole", RelationType::ComponentOf, "part", 3)
            .unwrap();
        assert_eq!(back, RelationOutcome::SkippedCycle);
        assert!(store.relations_from("whole").unwrap().is_empty());
        assert_eq!(store.relations_from("part").unwrap().len(), 1);
    }

    #[test]
    fn test_transitive_cycle_detected_across_relation_types() {
        let (store, _dir) = test_store();
        for id in ["a", "b", "c"] {
            holon(&store, id);
        }
        // a needs b (dependsOn), b needs c (c componentOf b)
        store
            .create_relation("a", RelationType::DependsOn, "b", 3)
            .unwrap();
        store
            .create_relation("c", RelationType::ComponentOf, "b", 3)
            .unwrap();

        // c needs a would close a -> b -> c -> a
        let outcome = store
            .create_relation("c", RelationType::DependsOn, "a", 3)
            .unwrap();
        assert_eq!(outcome, RelationOutcome::SkippedCycle);
    }

    #[test]
    fn test_member_of_never_cycle_checked() {
        let (store, _dir) = test_store();
        holon(&store, "alt");
        holon(&store, "ctx");
        store
            .create_relation("ctx", RelationType::ComponentOf, "alt", 3)
            .unwrap();
        let outcome = store
            .create_relation("alt", RelationType::MemberOf, "ctx", 3)
            .unwrap();
        assert_eq!(outcome, RelationOutcome::Created);
        assert_eq!(store.members_of("ctx").unwrap(), vec!["alt".to_string()]);
        assert!(store.dependencies_of("ctx").unwrap().is_empty());
    }

    #[test]
    fn test_dependencies_orientation() {
        let (store, _dir) = test_store();
        for id in ["whole", "part", "lib"] {
            holon(&store, id);
        }
        store
            .create_relation("part", RelationType::ComponentOf, "whole", 2)
            .unwrap();
        store
            .create_relation("whole", RelationType::DependsOn, "lib", 1)
            .unwrap();

        let deps = store.dependencies_of("whole").unwrap();
        assert_eq!(
            deps,
            vec![
                Dependency {
                    holon_id: "lib".to_string(),
                    congruence_level: Some(1)
                },
                Dependency {
                    holon_id: "part".to_string(),
                    congruence_level: Some(2)
                },
            ]
        );
        assert!(store.dependencies_of("part").unwrap().is_empty());
    }

    #[test]
    fn test_waivers_and_stale_evidence() {
        let (store, _dir) = test_store();
        holon(&store, "h");
        let now = Utc::now();
        for id in ["old-1", "old-2"] {
            store
                .add_evidence(&NewEvidence {
                    id: id.to_string(),
                    holon_id: "h".to_string(),
                    evidence_type: "test".to_string(),
                    content: "ran".to_string(),
                    verdict: "PASS".to_string(),
                    assurance_level: Some("L2".to_string()),
                    carrier_ref: None,
                    valid_until: Some(now - Duration::days(5)),
                })
                .unwrap();
        }
        store
            .create_waiver(&Waiver {
                id: "w1".to_string(),
                evidence_id: "old-2".to_string(),
                waived_by: "user".to_string(),
                waived_until: now + Duration::days(10),
                rationale: "rerun scheduled".to_string(),
            })
            .unwrap();

        let stale = store.stale_evidence(now).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].evidence_id, "old-1");
        assert!(stale[0].days_overdue >= 4);

        let waivers = store.active_waivers(now).unwrap();
        assert_eq!(waivers.len(), 1);
        assert_eq!(waivers[0].evidence_id, "old-2");

        let evidence = store.get_evidence_by_id("old-1").unwrap().unwrap();
        assert_eq!(evidence.verdict, "pass");
    }
}
