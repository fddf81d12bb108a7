use async_trait::async_trait;
use etl_core::{
    CleanedDataset, CleanedPost, CoreError, DatabaseConfig, DatabaseError, LoadReport, Sector,
};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::types::Json;
use sqlx::{Connection, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};


/// Advisory lock key serializing schema creation across concurrent sectors.
const SCHEMA_LOCK_KEY: i64 = 0x5345_4354_4f52; // "SECTOR"

const CREATE_POSTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS reddit_posts (
        sector VARCHAR(255) NOT NULL,
        post_id VARCHAR(255) NOT NULL,
        post_title TEXT,
        post_text TEXT,
        post_date TIMESTAMP,
        nbr_likes INTEGER,
        nbr_reposts INTEGER,
        nbr_characters INTEGER,
        author_id VARCHAR(255),
        comments JSONB,
        PRIMARY KEY (sector, post_id)
    )
"#;

const INSERT_POST: &str = r#"
    INSERT INTO reddit_posts (
        sector, post_id, post_title, post_text, post_date,
        nbr_likes, nbr_reposts, nbr_characters, author_id, comments
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (sector, post_id) DO NOTHING
"#;

/// Storage seam for the schema and load stages.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Creates the posts table when missing. Never alters an existing table.
    async fn ensure_schema(&self, sector: &Sector) -> Result<(), CoreError>;

    /// Inserts every post of the dataset, leaving existing `(sector, post_id)`
    /// rows untouched. All or nothing.
    async fn upsert_posts(&self, dataset: &CleanedDataset) -> Result<LoadReport, CoreError>;
}

/// PostgreSQL repository. Each call opens its own connection and closes it
/// before returning.
#[derive(Debug, Clone)]
pub struct PgPostRepository {
    options: PgConnectOptions,
}

impl PgPostRepository {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);
        Self { options }
    }

    pub fn from_url(url: &str) -> Result<Self, CoreError> {
        let options = PgConnectOptions::from_str(url).map_err(|e| DatabaseError::ConnectionFailed {
            reason: format!("invalid database url: {}", e),
        })?;
        Ok(Self { options })
    }

    async fn connect(&self) -> Result<PgConnection, CoreError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: e.to_string(),
                })
            })
    }

    async fn insert_all(
        tx: &mut Transaction<'_, Postgres>,
        dataset: &CleanedDataset,
    ) -> Result<LoadReport, CoreError> {
        let mut report = LoadReport::default();

        for post in &dataset.posts {
            let result = sqlx::query(INSERT_POST)
                .bind(dataset.sector.as_str())
                .bind(&post.post_id)
                .bind(&post.post_title)
                .bind(&post.post_text)
                .bind(post.post_date)
                .bind(post.nbr_likes)
                .bind(post.nbr_reposts)
                .bind(post.nbr_characters)
                .bind(&post.author_id)
                .bind(Json(&post.comments))
                .execute(&mut **tx)
                .await
                .map_err(|e| DatabaseError::InsertFailed {
                    post_id: post.post_id.clone(),
                    reason: e.to_string(),
                })?;

            if result.rows_affected() == 0 {
                debug!("Post {} already stored, skipping", post.post_id);
                report.skipped += 1;
            } else {
                report.inserted += 1;
            }
        }

        Ok(report)
    }

    /// Number of stored posts for a sector.
    pub async fn count_posts(&self, sector: &Sector) -> Result<i64, CoreError> {
        let mut conn = self.connect().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reddit_posts WHERE sector = $1")
            .bind(sector.as_str())
            .fetch_one(&mut conn)
            .await
            .map_err(DatabaseError::from)?;
        conn.close().await.map_err(DatabaseError::from)?;
        Ok(count)
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn ensure_schema(&self, sector: &Sector) -> Result<(), CoreError> {
        let schema_failed = |e: sqlx::Error| DatabaseError::SchemaFailed {
            sector: sector.to_string(),
            reason: e.to_string(),
        };

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await.map_err(schema_failed)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(schema_failed)?;
        sqlx::query(CREATE_POSTS_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(schema_failed)?;

        tx.commit().await.map_err(schema_failed)?;
        conn.close().await.map_err(DatabaseError::from)?;

        info!("Table reddit_posts ready for sector {}", sector);
        Ok(())
    }

    async fn upsert_posts(&self, dataset: &CleanedDataset) -> Result<LoadReport, CoreError> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await.map_err(|e| DatabaseError::TransactionFailed {
            reason: e.to_string(),
        })?;

        let report = match Self::insert_all(&mut tx, dataset).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("Rollback failed for sector {}: {}", dataset.sector, rollback_error);
                }
                return Err(e);
            }
        };

        tx.commit().await.map_err(|e| DatabaseError::TransactionFailed {
            reason: e.to_string(),
        })?;
        conn.close().await.map_err(DatabaseError::from)?;

        info!(
            "Sector {}: inserted {} posts, skipped {} existing",
            dataset.sector, report.inserted, report.skipped
        );
        Ok(report)
    }
}

/// In-process repository with the same insert-or-ignore semantics.
#[derive(Debug, Default)]
pub struct MemoryPostRepository {
    posts: Mutex<HashMap<(Sector, String), CleanedPost>>,
    schema_ready: Mutex<HashSet<Sector>>,
    failing_sectors: HashSet<Sector>,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts for `sector` fail without storing anything.
    pub fn fail_upserts_for(mut self, sector: Sector) -> Self {
        self.failing_sectors.insert(sector);
        self
    }

    pub async fn stored_posts(&self, sector: &Sector) -> Vec<CleanedPost> {
        let posts = self.posts.lock().await;
        let mut stored: Vec<CleanedPost> = posts
            .iter()
            .filter(|((s, _), _)| s == sector)
            .map(|(_, post)| post.clone())
            .collect();
        stored.sort_by(|a, b| a.post_id.cmp(&b.post_id));
        stored
    }

    pub async fn schema_ready(&self, sector: &Sector) -> bool {
        self.schema_ready.lock().await.contains(sector)
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn ensure_schema(&self, sector: &Sector) -> Result<(), CoreError> {
        self.schema_ready.lock().await.insert(sector.clone());
        Ok(())
    }

    async fn upsert_posts(&self, dataset: &CleanedDataset) -> Result<LoadReport, CoreError> {
        if self.failing_sectors.contains(&dataset.sector) {
            let post_id = dataset
                .posts
                .first()
                .map(|p| p.post_id.clone())
                .unwrap_or_default();
            return Err(CoreError::Database(DatabaseError::InsertFailed {
                post_id,
                reason: "simulated failure".to_string(),
            }));
        }

        let mut posts = self.posts.lock().await;
        let mut report = LoadReport::default();
        for post in &dataset.posts {
            let key = (dataset.sector.clone(), post.post_id.clone());
            if posts.contains_key(&key) {
                report.skipped += 1;
            } else {
                posts.insert(key, post.clone());
                report.inserted += 1;
            }
        }
        Ok(report)
    }
}
