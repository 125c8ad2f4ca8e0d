//! Database migrations
//!
//! Schema versions are recorded in `_migrations` and applied in order on
//! connection. Every migration is idempotent.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Concept graph
///
/// Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`), so they
/// compare correctly as text.
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS concepts (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL CHECK (length(trim(name)) > 0),
        description TEXT,
        aliases TEXT NOT NULL DEFAULT '[]', -- JSON array
        entry_count INTEGER NOT NULL DEFAULT 0 CHECK (entry_count >= 0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_concepts_owner ON concepts(owner_id);
    CREATE INDEX IF NOT EXISTS idx_concepts_owner_name ON concepts(owner_id, name);

    CREATE TABLE IF NOT EXISTS concept_relationships (
        source_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        relationship_type TEXT NOT NULL CHECK (relationship_type IN (
            'related_to', 'prerequisite_of', 'builds_on',
            'contrasts_with', 'example_of', 'part_of'
        )),
        strength REAL NOT NULL DEFAULT 1.0 CHECK (strength >= 0.0 AND strength <= 1.0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (source_id, target_id, relationship_type),
        CHECK (source_id <> target_id)
    );

    CREATE INDEX IF NOT EXISTS idx_concept_relationships_target
        ON concept_relationships(target_id);
"#;

/// Migration 2: Knowledge entries and review sessions
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS knowledge_entries (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        content TEXT NOT NULL,
        review_count INTEGER NOT NULL DEFAULT 0 CHECK (review_count >= 0),
        last_reviewed_at TEXT,
        next_review_at TEXT,
        retention_score REAL NOT NULL DEFAULT 0.0
            CHECK (retention_score >= 0.0 AND retention_score <= 1.0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_knowledge_entries_due
        ON knowledge_entries(owner_id, next_review_at);

    CREATE TABLE IF NOT EXISTS review_sessions (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        total_items INTEGER NOT NULL DEFAULT 0,
        completed_items INTEGER NOT NULL DEFAULT 0,
        correct_count INTEGER NOT NULL DEFAULT 0,
        average_response_time_ms REAL NOT NULL DEFAULT 0.0
    );

    CREATE INDEX IF NOT EXISTS idx_review_sessions_owner
        ON review_sessions(owner_id, started_at);

    -- At most one active session per owner
    CREATE UNIQUE INDEX IF NOT EXISTS idx_review_sessions_one_active
        ON review_sessions(owner_id) WHERE completed_at IS NULL;

    CREATE TABLE IF NOT EXISTS review_items (
        session_id TEXT NOT NULL REFERENCES review_sessions(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        entry_id TEXT NOT NULL,
        presented INTEGER NOT NULL DEFAULT 0,
        response TEXT CHECK (response IS NULL OR response IN ('forgot', 'hard', 'good', 'easy')),
        response_time_ms INTEGER,
        PRIMARY KEY (session_id, entry_id),
        CHECK (response IS NULL OR presented = 1)
    );
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Concept graph");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Review entries and sessions");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!needs_migration(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in [
            "concepts",
            "concept_relationships",
            "knowledge_entries",
            "review_sessions",
            "review_items",
        ] {
            let query = format!("SELECT COUNT(*) FROM {}", table);
            let (count,): (i64,) = sqlx::query_as(&query)
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|e| panic!("Table {} should exist: {}", table, e));
            assert_eq!(count, 0);
        }
    }

    #[tokio::test]
    async fn test_one_active_session_per_owner() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let insert = "INSERT INTO review_sessions (id, owner_id, started_at) VALUES (?, 'u-1', '2026-01-01T00:00:00.000000Z')";
        sqlx::query(insert).bind("s-1").execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).bind("s-2").execute(&pool).await.is_err());

        sqlx::query("UPDATE review_sessions SET completed_at = started_at WHERE id = 's-1'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(insert).bind("s-2").execute(&pool).await.unwrap();
    }
}
