use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docnest_shared::{Doc, DocMetadata, Revision, Role, ShareLink, Upload, User};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};

use super::{
    NewDoc, NewRevision, NewShareLink, NewUpload, NewUser, RevisionEntry, Store, Transaction,
    UserCredentials,
};
use crate::error::AppError;

pub type DbPool = PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct DocRow {
    id: i64,
    parent_id: Option<i64>,
    title: String,
    slug: String,
    urlpath: String,
    position: i32,
    public: bool,
    markdown: String,
    html: String,
    metadata: Json<DocMetadata>,
    updated_by_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocRow> for Doc {
    fn from(row: DocRow) -> Self {
        Doc {
            id: row.id,
            parent_id: row.parent_id,
            title: row.title,
            slug: row.slug,
            urlpath: row.urlpath,
            order: row.position,
            public: row.public,
            markdown: row.markdown,
            html: row.html,
            metadata: row.metadata.0,
            updated_by_id: row.updated_by_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

type RevisionRow = (
    i64,            // id
    i64,            // doc_id
    String,         // markdown
    String,         // html
    Option<i64>,    // created_by_id
    DateTime<Utc>,  // created_at
);

fn row_to_revision(row: RevisionRow) -> Revision {
    Revision {
        id: row.0,
        doc_id: row.1,
        markdown: row.2,
        html: row.3,
        created_by_id: row.4,
        created_at: row.5,
    }
}

type UserRow = (
    i64,            // id
    String,         // username
    Role,           // role
    DateTime<Utc>,  // created_at
    DateTime<Utc>,  // updated_at
);

fn row_to_user(row: UserRow) -> User {
    User {
        id: row.0,
        username: row.1,
        role: row.2,
        created_at: row.3,
        updated_at: row.4,
    }
}

#[derive(sqlx::FromRow)]
struct ShareLinkRow {
    id: i64,
    token: String,
    doc_id: i64,
    created_by_id: Option<i64>,
    expires_at: Option<DateTime<Utc>>,
    last_accessed_at: Option<DateTime<Utc>>,
    access_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShareLinkRow> for ShareLink {
    fn from(row: ShareLinkRow) -> Self {
        ShareLink {
            id: row.id,
            token: row.token,
            doc_id: row.doc_id,
            created_by_id: row.created_by_id,
            expires_at: row.expires_at,
            last_accessed_at: row.last_accessed_at,
            access_count: row.access_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

type UploadRow = (
    i64,            // id
    String,         // filename
    String,         // content_type
    i64,            // size
    bool,           // public
    Option<i64>,    // doc_id
    Option<i64>,    // created_by_id
    DateTime<Utc>,  // created_at
);

fn row_to_upload(row: UploadRow) -> Upload {
    Upload {
        id: row.0,
        filename: row.1,
        content_type: row.2,
        size: row.3,
        public: row.4,
        doc_id: row.5,
        created_by_id: row.6,
        created_at: row.7,
    }
}

/// The unique indexes back up the application-level checks; a race that
/// slips past a pre-check surfaces here as a conflict instead of a 500.
fn unique_violation(err: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("{what} already exists"));
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn get_doc(&mut self, id: i64) -> Result<Option<Doc>, AppError> {
        let row: Option<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Doc::from))
    }

    async fn get_doc_by_urlpath(&mut self, urlpath: &str) -> Result<Option<Doc>, AppError> {
        let row: Option<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE urlpath = $1
            "#,
        )
        .bind(urlpath)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Doc::from))
    }

    async fn get_root(&mut self) -> Result<Option<Doc>, AppError> {
        let row: Option<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE parent_id IS NULL
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Doc::from))
    }

    async fn find_child_by_slug(
        &mut self,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<Doc>, AppError> {
        let row: Option<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE parent_id = $1 AND slug = $2
            FOR UPDATE
            "#,
        )
        .bind(parent_id)
        .bind(slug)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Doc::from))
    }

    async fn list_children(
        &mut self,
        parent_ids: &[i64],
        public_only: bool,
    ) -> Result<Vec<Doc>, AppError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE parent_id = ANY($1) AND (NOT $2 OR public)
            ORDER BY parent_id, position, title, id
            "#,
        )
        .bind(parent_ids)
        .bind(public_only)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Doc::from).collect())
    }

    async fn max_child_order(&mut self, parent_id: i64) -> Result<Option<i32>, AppError> {
        let (max,): (Option<i32>,) =
            sqlx::query_as("SELECT MAX(position) FROM docs WHERE parent_id = $1")
                .bind(parent_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(max)
    }

    async fn list_docs(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<Doc>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM docs")
            .fetch_one(&mut *self.tx)
            .await?;

        let rows: Vec<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            ORDER BY position, title, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok((rows.into_iter().map(Doc::from).collect(), total))
    }

    async fn list_public_docs(&mut self) -> Result<Vec<Doc>, AppError> {
        let rows: Vec<DocRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, title, slug, urlpath, position, public, markdown, html,
                   metadata, updated_by_id, created_at, updated_at
            FROM docs
            WHERE public
            ORDER BY urlpath
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Doc::from).collect())
    }

    async fn insert_doc(&mut self, doc: NewDoc) -> Result<Doc, AppError> {
        let row: DocRow = sqlx::query_as(
            r#"
            INSERT INTO docs (parent_id, title, slug, urlpath, position, public, markdown, html,
                              metadata, updated_by_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING id, parent_id, title, slug, urlpath, position, public, markdown, html,
                      metadata, updated_by_id, created_at, updated_at
            "#,
        )
        .bind(doc.parent_id)
        .bind(&doc.title)
        .bind(&doc.slug)
        .bind(&doc.urlpath)
        .bind(doc.order)
        .bind(doc.public)
        .bind(&doc.markdown)
        .bind(&doc.html)
        .bind(Json(&doc.metadata))
        .bind(doc.updated_by_id)
        .bind(doc.now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "A document with this path"))?;

        Ok(row.into())
    }

    async fn update_doc(&mut self, doc: &Doc) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE docs
            SET parent_id = $1,
                title = $2,
                slug = $3,
                urlpath = $4,
                position = $5,
                public = $6,
                markdown = $7,
                html = $8,
                metadata = $9,
                updated_by_id = $10,
                updated_at = $11
            WHERE id = $12
            "#,
        )
        .bind(doc.parent_id)
        .bind(&doc.title)
        .bind(&doc.slug)
        .bind(&doc.urlpath)
        .bind(doc.order)
        .bind(doc.public)
        .bind(&doc.markdown)
        .bind(&doc.html)
        .bind(Json(&doc.metadata))
        .bind(doc.updated_by_id)
        .bind(doc.updated_at)
        .bind(doc.id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "A document with this path"))?;

        Ok(())
    }

    async fn set_urlpath(
        &mut self,
        id: i64,
        urlpath: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE docs SET urlpath = $1, updated_at = $2 WHERE id = $3")
            .bind(urlpath)
            .bind(now)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| unique_violation(e, "A document with this path"))?;

        Ok(())
    }

    async fn set_orders(&mut self, orders: &[(i64, i32)]) -> Result<(), AppError> {
        for (id, position) in orders {
            sqlx::query("UPDATE docs SET position = $1 WHERE id = $2")
                .bind(position)
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
        }

        Ok(())
    }

    async fn delete_docs(&mut self, ids: &[i64]) -> Result<u64, AppError> {
        // Revisions, share links and any remaining children cascade via FK.
        let result = sqlx::query("DELETE FROM docs WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload, AppError> {
        let row: UploadRow = sqlx::query_as(
            r#"
            INSERT INTO uploads (filename, content_type, size, public, doc_id, created_by_id,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id, filename, content_type, size, public, doc_id, created_by_id, created_at
            "#,
        )
        .bind(&upload.filename)
        .bind(&upload.content_type)
        .bind(upload.size)
        .bind(upload.public)
        .bind(upload.doc_id)
        .bind(upload.created_by_id)
        .bind(upload.now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row_to_upload(row))
    }

    async fn get_upload(&mut self, id: i64) -> Result<Option<Upload>, AppError> {
        let row: Option<UploadRow> = sqlx::query_as(
            r#"
            SELECT id, filename, content_type, size, public, doc_id, created_by_id, created_at
            FROM uploads
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(row_to_upload))
    }

    async fn set_uploads_public(&mut self, doc_id: i64, public: bool) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE uploads SET public = $1 WHERE doc_id = $2")
            .bind(public)
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn detach_uploads(&mut self, doc_ids: &[i64]) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE uploads SET doc_id = NULL WHERE doc_id = ANY($1)")
            .bind(doc_ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_revision(&mut self, revision: NewRevision) -> Result<Revision, AppError> {
        let row: RevisionRow = sqlx::query_as(
            r#"
            INSERT INTO revisions (doc_id, markdown, html, created_by_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, doc_id, markdown, html, created_by_id, created_at
            "#,
        )
        .bind(revision.doc_id)
        .bind(&revision.markdown)
        .bind(&revision.html)
        .bind(revision.created_by_id)
        .bind(revision.now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row_to_revision(row))
    }

    async fn get_revision(
        &mut self,
        doc_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>, AppError> {
        let row: Option<RevisionRow> = sqlx::query_as(
            r#"
            SELECT id, doc_id, markdown, html, created_by_id, created_at
            FROM revisions
            WHERE id = $1 AND doc_id = $2
            "#,
        )
        .bind(revision_id)
        .bind(doc_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(row_to_revision))
    }

    async fn list_revisions(
        &mut self,
        doc_id: i64,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<RevisionEntry>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM revisions WHERE doc_id = $1")
            .bind(doc_id)
            .fetch_one(&mut *self.tx)
            .await?;

        let rows: Vec<(i64, i64, String, String, Option<i64>, DateTime<Utc>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT r.id, r.doc_id, r.markdown, r.html, r.created_by_id, r.created_at,
                       u.username
                FROM revisions r
                LEFT JOIN users u ON u.id = r.created_by_id
                WHERE r.doc_id = $1
                ORDER BY r.created_at DESC, r.id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(doc_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await?;

        let entries = rows
            .into_iter()
            .map(|(id, doc_id, markdown, html, created_by_id, created_at, username)| {
                RevisionEntry {
                    revision: row_to_revision((id, doc_id, markdown, html, created_by_id, created_at)),
                    created_by_username: username,
                }
            })
            .collect();

        Ok((entries, total))
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (username, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, username, role, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "A user with this username"))?;

        Ok(row_to_user(row))
    }

    async fn get_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(row_to_user))
    }

    async fn find_user_credentials(
        &mut self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AppError> {
        let row: Option<(i64, String, Role, DateTime<Utc>, DateTime<Utc>, String)> =
            sqlx::query_as(
                r#"
                SELECT id, username, role, created_at, updated_at, password_hash
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(
            |(id, username, role, created_at, updated_at, password_hash)| UserCredentials {
                user: row_to_user((id, username, role, created_at, updated_at)),
                password_hash,
            },
        ))
    }

    async fn list_users(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<User>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.tx)
            .await?;

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, role, created_at, updated_at
            FROM users
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok((rows.into_iter().map(row_to_user).collect(), total))
    }

    async fn update_user(&mut self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET username = $2, role = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.role)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "A user with this username"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_password_hash(
        &mut self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .bind(now)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&mut self, id: i64) -> Result<bool, AppError> {
        // Author columns are ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_share_link(&mut self, link: NewShareLink) -> Result<ShareLink, AppError> {
        let row: ShareLinkRow = sqlx::query_as(
            r#"
            INSERT INTO shareable_links (token, doc_id, created_by_id, expires_at,
                                         created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, token, doc_id, created_by_id, expires_at, last_accessed_at,
                      access_count, created_at, updated_at
            "#,
        )
        .bind(&link.token)
        .bind(link.doc_id)
        .bind(link.created_by_id)
        .bind(link.expires_at)
        .bind(link.now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "A share link with this token"))?;

        Ok(row.into())
    }

    async fn get_share_link(&mut self, id: i64) -> Result<Option<ShareLink>, AppError> {
        let row: Option<ShareLinkRow> = sqlx::query_as(
            r#"
            SELECT id, token, doc_id, created_by_id, expires_at, last_accessed_at,
                   access_count, created_at, updated_at
            FROM shareable_links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(ShareLink::from))
    }

    async fn get_share_link_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<ShareLink>, AppError> {
        let row: Option<ShareLinkRow> = sqlx::query_as(
            r#"
            SELECT id, token, doc_id, created_by_id, expires_at, last_accessed_at,
                   access_count, created_at, updated_at
            FROM shareable_links
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(ShareLink::from))
    }

    async fn list_share_links(
        &mut self,
        doc_id: i64,
        created_by_id: Option<i64>,
    ) -> Result<Vec<ShareLink>, AppError> {
        let rows: Vec<ShareLinkRow> = sqlx::query_as(
            r#"
            SELECT id, token, doc_id, created_by_id, expires_at, last_accessed_at,
                   access_count, created_at, updated_at
            FROM shareable_links
            WHERE doc_id = $1 AND ($2::BIGINT IS NULL OR created_by_id = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(doc_id)
        .bind(created_by_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(ShareLink::from).collect())
    }

    async fn delete_share_link(&mut self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM shareable_links WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn record_share_access(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ShareLink, AppError> {
        let row: ShareLinkRow = sqlx::query_as(
            r#"
            UPDATE shareable_links
            SET last_accessed_at = $1,
                access_count = access_count + 1
            WHERE id = $2
            RETURNING id, token, doc_id, created_by_id, expires_at, last_accessed_at,
                      access_count, created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(row.into())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
