//! SQLite implementation of the GraphRepository
//!
//! A commit runs in one transaction. Snapshots read concepts and edges inside
//! one read transaction, so both lists come from the same database state.

use async_trait::async_trait;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::domain::graph::{
    Concept, GraphChanges, GraphRepository, GraphSnapshot, Relationship, RelationshipType,
};
use crate::error::{Error, Result};
use crate::infrastructure::{decode_time, encode_time};

/// SQLite implementation of the graph repository
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    /// Create a new SQLite graph repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn apply(tx: &mut Transaction<'_, Sqlite>, changes: &GraphChanges) -> Result<()> {
        for key in changes.relationship_deletes() {
            sqlx::query(
                "DELETE FROM concept_relationships
                 WHERE source_id = ? AND target_id = ? AND relationship_type = ?",
            )
            .bind(&key.source_id)
            .bind(&key.target_id)
            .bind(key.relationship_type.as_str())
            .execute(&mut **tx)
            .await?;
        }

        for concept in changes.concept_upserts() {
            if concept.owner_id != changes.owner_id() {
                return Err(Error::validation(format!(
                    "concept '{}' does not belong to owner '{}'",
                    concept.id,
                    changes.owner_id()
                )));
            }
            let aliases_json = serde_json::to_string(&concept.aliases)?;
            sqlx::query(
                r#"
                INSERT INTO concepts (
                    id, owner_id, name, description, aliases, entry_count, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    aliases = excluded.aliases,
                    entry_count = excluded.entry_count,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&concept.id)
            .bind(&concept.owner_id)
            .bind(&concept.name)
            .bind(&concept.description)
            .bind(&aliases_json)
            .bind(concept.entry_count as i64)
            .bind(encode_time(&concept.created_at))
            .bind(encode_time(&concept.updated_at))
            .execute(&mut **tx)
            .await?;
        }

        for rel in changes.relationship_upserts() {
            let (owners,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM concepts WHERE id IN (?, ?) AND owner_id = ?",
            )
            .bind(&rel.source_id)
            .bind(&rel.target_id)
            .bind(changes.owner_id())
            .fetch_one(&mut **tx)
            .await?;
            if owners != 2 {
                return Err(Error::validation(format!(
                    "relationship {} must connect two existing concepts of owner '{}'",
                    rel.key(),
                    changes.owner_id()
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO concept_relationships (
                    source_id, target_id, relationship_type, strength, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(source_id, target_id, relationship_type) DO UPDATE SET
                    strength = excluded.strength,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&rel.source_id)
            .bind(&rel.target_id)
            .bind(rel.relationship_type.as_str())
            .bind(rel.strength)
            .bind(encode_time(&rel.created_at))
            .bind(encode_time(&rel.updated_at))
            .execute(&mut **tx)
            .await?;
        }

        for id in changes.concept_deletes() {
            // Edges go with the concept via ON DELETE CASCADE
            sqlx::query("DELETE FROM concepts WHERE id = ?")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        let row: Option<ConceptRow> = sqlx::query_as("SELECT * FROM concepts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_concept()).transpose()
    }

    async fn list_concepts(&self, owner_id: &str) -> Result<Vec<Concept>> {
        let rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? ORDER BY name, id")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.into_concept()).collect()
    }

    async fn list_relationships_for(&self, concept_id: &str) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT * FROM concept_relationships
            WHERE source_id = ? OR target_id = ?
            ORDER BY source_id, target_id, relationship_type
            "#,
        )
        .bind(concept_id)
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn load_snapshot(&self, owner_id: &str) -> Result<GraphSnapshot> {
        let mut tx = self.pool.begin().await?;

        let concept_rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&mut *tx)
                .await?;
        let relationship_rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT r.* FROM concept_relationships r
            JOIN concepts c ON c.id = r.source_id
            WHERE c.owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(GraphSnapshot {
            owner_id: owner_id.to_string(),
            concepts: concept_rows
                .into_iter()
                .map(|r| r.into_concept())
                .collect::<Result<_>>()?,
            relationships: relationship_rows
                .into_iter()
                .map(|r| r.into_relationship())
                .collect::<Result<_>>()?,
        })
    }

    async fn commit(&self, changes: GraphChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        // Returning early drops `tx`, which rolls the transaction back
        Self::apply(&mut tx, &changes).await?;
        tx.commit().await?;

        debug!(
            owner_id = %changes.owner_id(),
            concept_upserts = changes.concept_upserts().len(),
            concept_deletes = changes.concept_deletes().len(),
            relationship_upserts = changes.relationship_upserts().len(),
            relationship_deletes = changes.relationship_deletes().len(),
            "Graph changes committed"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

// ========== Row Types ==========

#[derive(FromRow)]
struct ConceptRow {
    id: String,
    owner_id: String,
    name: String,
    description: Option<String>,
    aliases: String,
    entry_count: i64,
    created_at: String,
    updated_at: String,
}

impl ConceptRow {
    fn into_concept(self) -> Result<Concept> {
        let aliases: Vec<String> = serde_json::from_str(&self.aliases)?;
        let entry_count = u64::try_from(self.entry_count).map_err(|_| {
            Error::CorruptData(format!(
                "concept '{}' has negative entry count {}",
                self.id, self.entry_count
            ))
        })?;

        Ok(Concept {
            created_at: decode_time(&self.created_at)?,
            updated_at: decode_time(&self.updated_at)?,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            aliases,
            entry_count,
        })
    }
}

#[derive(FromRow)]
struct RelationshipRow {
    source_id: String,
    target_id: String,
    relationship_type: String,
    strength: f64,
    created_at: String,
    updated_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<Relationship> {
        let relationship_type = RelationshipType::parse(&self.relationship_type).ok_or_else(|| {
            Error::CorruptData(format!(
                "invalid relationship type: {}",
                self.relationship_type
            ))
        })?;

        Ok(Relationship {
            created_at: decode_time(&self.created_at)?,
            updated_at: decode_time(&self.updated_at)?,
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type,
            strength: self.strength,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::NewConcept;
    use crate::storage::run_migrations;
    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_repo() -> SqliteGraphRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqliteGraphRepository::new(pool)
    }

    fn concept(id: &str, owner: &str) -> Concept {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        Concept::new(
            id,
            NewConcept::new(owner, id.to_uppercase())
                .with_description("about it")
                .with_aliases(["alt"]),
            now,
        )
        .unwrap()
    }

    fn edge(s: &str, t: &str, strength: f64) -> Relationship {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        Relationship::new(s, t, RelationshipType::BuildsOn, strength, now).unwrap()
    }

    #[tokio::test]
    async fn test_concept_round_trip() {
        let repo = create_test_repo().await;
        let mut changes = GraphChanges::new("u-1");
        changes.upsert_concept(concept("a", "u-1"));
        repo.commit(changes).await.unwrap();

        let loaded = repo.get_concept("a").await.unwrap().unwrap();
        assert_eq!(loaded, concept("a", "u-1"));
        assert!(repo.get_concept("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relationship_upsert_and_cascade() {
        let repo = create_test_repo().await;
        let mut changes = GraphChanges::new("u-1");
        changes
            .upsert_concept(concept("a", "u-1"))
            .upsert_concept(concept("b", "u-1"))
            .upsert_relationship(edge("a", "b", 0.4));
        repo.commit(changes).await.unwrap();

        let mut update = GraphChanges::new("u-1");
        update.upsert_relationship(edge("a", "b", 0.9));
        repo.commit(update).await.unwrap();

        let edges = repo.list_relationships_for("b").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].strength, 0.9);

        let mut delete = GraphChanges::new("u-1");
        delete.delete_concept("a");
        repo.commit(delete).await.unwrap();
        assert!(repo.list_relationships_for("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let repo = create_test_repo().await;
        let mut seed = GraphChanges::new("u-1");
        seed.upsert_concept(concept("a", "u-1"))
            .upsert_concept(concept("b", "u-1"))
            .upsert_relationship(edge("a", "b", 0.4));
        repo.commit(seed).await.unwrap();

        let mut bad = GraphChanges::new("u-1");
        bad.delete_relationship(edge("a", "b", 0.4).key())
            .upsert_concept(concept("c", "u-1"))
            .upsert_relationship(edge("c", "ghost", 0.5));
        assert!(repo.commit(bad).await.is_err());

        assert!(repo.get_concept("c").await.unwrap().is_none());
        assert_eq!(repo.list_relationships_for("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_and_listing_are_owner_scoped() {
        let repo = create_test_repo().await;
        let mut one = GraphChanges::new("u-1");
        one.upsert_concept(concept("b", "u-1"))
            .upsert_concept(concept("a", "u-1"))
            .upsert_relationship(edge("a", "b", 1.0));
        repo.commit(one).await.unwrap();
        let mut two = GraphChanges::new("u-2");
        two.upsert_concept(concept("z", "u-2"));
        repo.commit(two).await.unwrap();

        let names: Vec<_> = repo
            .list_concepts("u-1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);

        let snapshot = repo.load_snapshot("u-2").await.unwrap();
        assert_eq!(snapshot.concepts.len(), 1);
        assert!(snapshot.relationships.is_empty());

        repo.health_check().await.unwrap();
    }
}
