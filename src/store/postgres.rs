//! PostgreSQL document store
//!
//! Documents live in a single `documents` table keyed by
//! `(collection, id)` with a JSONB body. Filters compile to `#>`/`#>>`
//! predicates and updates to nested `jsonb_set` calls. Note that
//! `jsonb_set` only creates the last segment of a missing path, so nested
//! `$set` paths need their parent object to exist.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Postgres, QueryBuilder, Row,
};
use uuid::Uuid;

use super::{Condition, Document, DocumentStore, Filter, StoreError, StoreResult, Update};
use crate::config::StoreConfig;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using the store settings
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the document table if needed
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, collection: &str, filter: &Filter) {
    qb.push(" WHERE collection = ").push_bind(collection.to_string());
    for (path, cond) in filter.clauses() {
        match cond {
            Condition::Eq(Value::Null) => {
                qb.push(" AND (body #> ")
                    .push_bind(split_path(path))
                    .push(" IS NULL OR body #> ")
                    .push_bind(split_path(path))
                    .push(" = 'null'::jsonb)");
            }
            Condition::Eq(value) => {
                qb.push(" AND body #> ")
                    .push_bind(split_path(path))
                    .push(" = ")
                    .push_bind(Json(value.clone()));
            }
            Condition::Gt(bound) => {
                qb.push(" AND (body #>> ")
                    .push_bind(split_path(path))
                    .push(")::float8 > ")
                    .push_bind(*bound);
            }
        }
    }
}

fn push_update_expr(qb: &mut QueryBuilder<'static, Postgres>, update: &Update) {
    for _ in 0..(update.sets().len() + update.incs().len()) {
        qb.push("jsonb_set(");
    }
    qb.push("body");
    for (path, value) in update.sets() {
        qb.push(", ")
            .push_bind(split_path(path))
            .push(", ")
            .push_bind(Json(value.clone()))
            .push(", true)");
    }
    for (path, by) in update.incs() {
        qb.push(", ")
            .push_bind(split_path(path))
            .push(", to_jsonb(COALESCE((body #>> ")
            .push_bind(split_path(path))
            .push(")::bigint, 0) + ")
            .push_bind(*by)
            .push("), true)");
    }
}

/// `UPDATE` of the first document (by insertion order) matching `filter`
fn update_first_query(collection: &str, filter: &Filter, update: &Update) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE documents SET body = ");
    push_update_expr(&mut qb, update);
    qb.push(" WHERE collection = ")
        .push_bind(collection.to_string())
        .push(" AND id = (SELECT id FROM documents");
    push_filter(&mut qb, collection, filter);
    qb.push(" ORDER BY seq LIMIT 1 FOR UPDATE) RETURNING body");
    qb
}

fn body(row: &PgRow) -> StoreResult<Document> {
    Ok(row.try_get::<Json<Document>, _>("body")?.0)
}

fn lock_key(collection: &str, filter: &Filter) -> String {
    let mut key = collection.to_string();
    for (path, cond) in filter.clauses() {
        key.push('|');
        key.push_str(path);
        match cond {
            Condition::Eq(value) => key.push_str(&format!("={}", value)),
            Condition::Gt(bound) => key.push_str(&format!(">{}", bound)),
        }
    }
    key
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let mut qb = QueryBuilder::new("SELECT body FROM documents");
        push_filter(&mut qb, collection, filter);
        qb.push(" ORDER BY seq LIMIT 1");

        qb.build()
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(body)
            .transpose()
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::new("SELECT body FROM documents");
        push_filter(&mut qb, collection, filter);
        qb.push(" ORDER BY seq");

        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(body)
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS n FROM documents");
        push_filter(&mut qb, collection, filter);

        let row = qb.build().fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn insert_one(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(document))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let mut qb = update_first_query(collection, filter, update);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new("UPDATE documents SET body = ");
        push_update_expr(&mut qb, update);
        push_filter(&mut qb, collection, filter);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>> {
        let mut qb = update_first_query(collection, filter, update);
        qb.build()
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(body)
            .transpose()
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<Document> {
        let mut tx = self.pool.begin().await?;

        // Serialise upserts sharing this filter until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key(collection, filter))
            .execute(&mut *tx)
            .await?;

        let mut qb = update_first_query(collection, filter, update);
        let existing = qb.build().fetch_optional(&mut *tx).await?;

        let document = match existing {
            Some(row) => body(&row)?,
            None => {
                let mut created = filter.seed();
                created.extend(on_insert);
                update.apply(&mut created)?;

                sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
                    .bind(collection)
                    .bind(Uuid::new_v4().to_string())
                    .bind(Json(created.clone()))
                    .execute(&mut *tx)
                    .await?;
                created
            }
        };

        tx.commit().await?;
        Ok(document)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new("DELETE FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string())
            .push(" AND id = (SELECT id FROM documents");
        push_filter(&mut qb, collection, filter);
        qb.push(" ORDER BY seq LIMIT 1 FOR UPDATE)");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
