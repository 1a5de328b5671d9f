use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;

use crate::models::{AnimalRecord, FootprintRecord, NewFootprint};
use crate::store::{AnimalCatalog, FootprintLedger, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS animals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    species TEXT NOT NULL UNIQUE,
    card_url TEXT NOT NULL DEFAULT '',
    fun_fact TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS footprints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    animal_id INTEGER NOT NULL REFERENCES animals(id),
    image_url TEXT NOT NULL
);
"#;

#[derive(sqlx::FromRow)]
struct AnimalRow {
    id: i64,
    species: String,
    card_url: String,
    fun_fact: String,
}

impl From<AnimalRow> for AnimalRecord {
    fn from(row: AnimalRow) -> Self {
        AnimalRecord {
            id: row.id,
            species: row.species,
            card_url: row.card_url,
            fun_fact: row.fun_fact,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FootprintRow {
    id: i64,
    animal_id: i64,
    image_url: String,
}

/// Local mirror of the species and footprint tables.
///
/// Used for offline runs and as the catalog behind the integration tests.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let db_file = db_file.as_ref();
        if let Some(parent) = db_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open catalog database {:?}", db_file))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to initialize catalog schema")?;

        Ok(Self { pool })
    }

    pub async fn insert_animal(&self, species: &str, card_url: &str, fun_fact: &str) -> anyhow::Result<i64> {
        let id = sqlx::query("INSERT INTO animals (species, card_url, fun_fact) VALUES ($1, $2, $3)")
            .bind(species)
            .bind(card_url)
            .bind(fun_fact)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert species {}", species))?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn footprints(&self) -> anyhow::Result<Vec<FootprintRecord>> {
        let rows: Vec<FootprintRow> =
            sqlx::query_as("SELECT id, animal_id, image_url FROM footprints ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| FootprintRecord {
                id: r.id,
                animal_id: r.animal_id,
                image_url: r.image_url,
            })
            .collect())
    }
}

impl AnimalCatalog for SqliteCatalog {
    async fn find_by_species(&self, species: &str) -> StoreResult<Option<AnimalRecord>> {
        let row: Option<AnimalRow> = sqlx::query_as(
            "SELECT id, species, card_url, fun_fact FROM animals WHERE species = $1 LIMIT 1",
        )
        .bind(species)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AnimalRecord::from))
    }

    async fn any_animal(&self) -> StoreResult<Option<AnimalRecord>> {
        let row: Option<AnimalRow> =
            sqlx::query_as("SELECT id, species, card_url, fun_fact FROM animals ORDER BY id LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(AnimalRecord::from))
    }
}

impl FootprintLedger for SqliteCatalog {
    async fn insert_footprint(&self, footprint: &NewFootprint) -> StoreResult<()> {
        sqlx::query("INSERT INTO footprints (animal_id, image_url) VALUES ($1, $2)")
            .bind(footprint.animal_id)
            .bind(&footprint.image_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
