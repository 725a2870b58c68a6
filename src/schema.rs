use rusqlite::{Connection, OptionalExtension};

use crate::errors::ContentGraphError;

pub const BASE_SCHEMA_VERSION: i64 = 1;

struct MigrationStep {
    target_version: i64,
    statements: &'static [&'static str],
}

const MIGRATION_STEPS: &[MigrationStep] = &[MigrationStep {
    target_version: 2,
    statements: &[
        r#"CREATE VIEW IF NOT EXISTS node_search AS
            SELECT owner.id AS id,
                   owner.hash AS hash,
                   json_extract(syn.data, '$.source') AS source,
                   json_extract(syn.data, '$.value') AS value
            FROM edge e
            JOIN node syn ON syn.id = e.destination_id AND syn.node_type_id = 'synonym'
            JOIN node owner ON owner.id = e.source_id
            WHERE e.relationship = 'has_synonym'"#,
        "CREATE INDEX IF NOT EXISTS idx_edge_relationship_destination ON edge(relationship, destination_id)",
        "INSERT INTO graph_meta_history(version) VALUES(2)",
    ],
}, MigrationStep {
    target_version: 3,
    // Lookups by synonym value start from the value index, then walk to the owner.
    statements: &[
        "CREATE INDEX IF NOT EXISTS idx_node_value ON node(json_extract(data, '$.value'))",
        "DROP VIEW IF EXISTS node_search",
        r#"CREATE VIEW node_search AS
            SELECT owner.id AS id,
                   owner.hash AS hash,
                   json_extract(syn.data, '$.source') AS source,
                   json_extract(syn.data, '$.value') AS value
            FROM node syn
            CROSS JOIN edge e ON e.destination_id = syn.id AND e.relationship = 'has_synonym'
            CROSS JOIN node owner ON owner.id = e.source_id
            WHERE +syn.node_type_id = 'synonym'"#,
        "INSERT INTO graph_meta_history(version) VALUES(3)",
    ],
}];

pub const SCHEMA_VERSION: i64 = BASE_SCHEMA_VERSION + MIGRATION_STEPS.len() as i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub statements: Vec<&'static str>,
    pub dry_run: bool,
}

pub fn ensure_schema(conn: &Connection) -> Result<(), ContentGraphError> {
    ensure_base_schema(conn)?;
    ensure_meta(conn)?;
    run_pending_migrations(conn, false)?;
    Ok(())
}

pub fn ensure_schema_without_migrations(conn: &Connection) -> Result<(), ContentGraphError> {
    ensure_base_schema(conn)?;
    ensure_meta(conn)?;
    Ok(())
}

fn ensure_base_schema(conn: &Connection) -> Result<(), ContentGraphError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS node (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            node_type_id TEXT NOT NULL,
            data         TEXT NOT NULL,
            hash         TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS edge (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id      INTEGER NOT NULL REFERENCES node(id),
            destination_id INTEGER NOT NULL REFERENCES node(id),
            relationship   TEXT NOT NULL,
            hash           TEXT NOT NULL UNIQUE,
            data           TEXT
        );
        CREATE TABLE IF NOT EXISTS node_history (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id        INTEGER NOT NULL REFERENCES node(id),
            source         TEXT NOT NULL,
            source_details TEXT,
            change_type    TEXT NOT NULL CHECK (change_type IN ('create', 'modify', 'delete')),
            time           TEXT NOT NULL,
            attribution    TEXT,
            changed_field  TEXT
        );
        CREATE TABLE IF NOT EXISTS edge_history (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            edge_id        INTEGER NOT NULL REFERENCES edge(id),
            source         TEXT NOT NULL,
            source_details TEXT,
            change_type    TEXT NOT NULL CHECK (change_type IN ('create', 'modify', 'delete')),
            time           TEXT NOT NULL,
            attribution    TEXT,
            changed_field  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_node_type ON node(node_type_id);
        CREATE INDEX IF NOT EXISTS idx_edge_source ON edge(source_id);
        CREATE INDEX IF NOT EXISTS idx_edge_destination ON edge(destination_id);
        CREATE INDEX IF NOT EXISTS idx_node_history_node ON node_history(node_id);
        CREATE INDEX IF NOT EXISTS idx_edge_history_edge ON edge_history(edge_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_node_history_single_create
            ON node_history(node_id) WHERE change_type = 'create';
        CREATE UNIQUE INDEX IF NOT EXISTS idx_edge_history_single_create
            ON edge_history(edge_id) WHERE change_type = 'create';
        CREATE TABLE IF NOT EXISTS graph_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_meta_history (
            version    INTEGER NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .map_err(|e| ContentGraphError::schema(e.to_string()))
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, ContentGraphError> {
    conn.query_row(
        "SELECT schema_version FROM graph_meta WHERE id=1",
        [],
        |row| row.get(0),
    )
    .map_err(|e| ContentGraphError::schema(e.to_string()))
}

pub fn run_pending_migrations(
    conn: &Connection,
    dry_run: bool,
) -> Result<MigrationReport, ContentGraphError> {
    let current = read_schema_version(conn)?;
    let mut statements: Vec<&'static str> = Vec::new();
    let mut target = current;
    for step in MIGRATION_STEPS {
        if step.target_version > current {
            target = step.target_version;
            statements.extend_from_slice(step.statements);
        }
    }
    if statements.is_empty() || dry_run {
        return Ok(MigrationReport {
            from_version: current,
            to_version: target,
            statements,
            dry_run,
        });
    }
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| ContentGraphError::schema(e.to_string()))?;
    let result: Result<(), ContentGraphError> = (|| {
        for sql in statements.iter().copied() {
            conn.execute(sql, [])
                .map_err(|e| ContentGraphError::schema(e.to_string()))?;
        }
        conn.execute(
            "UPDATE graph_meta SET schema_version=?1 WHERE id=1",
            [target],
        )
        .map_err(|e| ContentGraphError::schema(e.to_string()))?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute("COMMIT", [])
                .map_err(|e| ContentGraphError::schema(e.to_string()))?;
        }
        Err(err) => {
            let _ = conn.execute("ROLLBACK", []);
            return Err(err);
        }
    }
    tracing::info!(from = current, to = target, "applied schema migrations");
    Ok(MigrationReport {
        from_version: current,
        to_version: target,
        statements,
        dry_run,
    })
}

fn ensure_meta(conn: &Connection) -> Result<(), ContentGraphError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM graph_meta WHERE id=1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| ContentGraphError::schema(e.to_string()))?;
    match version {
        Some(existing) => {
            if existing > SCHEMA_VERSION {
                return Err(ContentGraphError::schema(format!(
                    "database schema version {existing} is newer than supported {SCHEMA_VERSION}"
                )));
            }
            if existing < BASE_SCHEMA_VERSION {
                conn.execute(
                    "UPDATE graph_meta SET schema_version=?1 WHERE id=1",
                    [BASE_SCHEMA_VERSION],
                )
                .map_err(|e| ContentGraphError::schema(e.to_string()))?;
            }
        }
        None => {
            conn.execute(
                "INSERT INTO graph_meta(id, schema_version) VALUES(1, ?1)",
                [BASE_SCHEMA_VERSION],
            )
            .map_err(|e| ContentGraphError::schema(e.to_string()))?;
        }
    }
    Ok(())
}
