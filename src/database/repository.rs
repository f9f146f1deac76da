use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{NewUser, Product, ProductFields, User};

pub(crate) const PRODUCT_NOT_FOUND: &str = "Product not found.";

/// Stored row after an update, plus the image path it no longer references
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedProduct {
    pub product: Product,
    pub replaced_image: Option<String>,
}

/// Previous path when `new_image` displaced it
pub(crate) fn displaced_image(previous: Option<String>, new_image: Option<&str>) -> Option<String> {
    match new_image {
        Some(new) => previous.filter(|old| old != new),
        None => None,
    }
}

/// CRUD over persisted products
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// All products in insertion order
    async fn list(&self) -> Result<Vec<Product>, DatabaseError>;

    async fn get(&self, id: i64) -> Result<Product, DatabaseError>;

    async fn create(&self, fields: ProductFields, image_path: Option<String>) -> Result<Product, DatabaseError>;

    /// `image_path: None` keeps the stored image. `replaced_image` is read
    /// atomically with the write.
    async fn update(
        &self,
        id: i64,
        fields: ProductFields,
        image_path: Option<String>,
    ) -> Result<UpdatedProduct, DatabaseError>;

    /// Returns the removed record.
    async fn delete(&self, id: i64) -> Result<Product, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Read access to accounts, plus creation for the admin CLI
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError>;

    async fn create(&self, user: NewUser) -> Result<User, DatabaseError>;
}

/// Token ids invalidated before their natural expiry
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// `true` when this call revoked the token, `false` when it already was.
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, DatabaseError>;
}

const PRODUCT_COLUMNS: &str = "id, name, price, image_path, created_at, updated_at";

#[derive(FromRow)]
struct UpdatedRow {
    #[sqlx(flatten)]
    product: Product,
    previous_image_path: Option<String>,
}

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn product_not_found() -> DatabaseError {
    DatabaseError::NotFound(PRODUCT_NOT_FOUND.to_string())
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn list(&self) -> Result<Vec<Product>, DatabaseError> {
        let sql = format!("SELECT {} FROM products ORDER BY id", PRODUCT_COLUMNS);
        Ok(sqlx::query_as::<_, Product>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get(&self, id: i64) -> Result<Product, DatabaseError> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(product_not_found)
    }

    async fn create(&self, fields: ProductFields, image_path: Option<String>) -> Result<Product, DatabaseError> {
        let sql = format!(
            "INSERT INTO products (name, price, image_path) VALUES ($1, $2, $3) RETURNING {}",
            PRODUCT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(fields.name)
            .bind(fields.price)
            .bind(image_path)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update(
        &self,
        id: i64,
        fields: ProductFields,
        image_path: Option<String>,
    ) -> Result<UpdatedProduct, DatabaseError> {
        // FOR UPDATE makes a concurrent update wait and then see this one's image
        let row = sqlx::query_as::<_, UpdatedRow>(
            r#"
            WITH previous AS (
                SELECT id, image_path FROM products WHERE id = $1 FOR UPDATE
            )
            UPDATE products AS p
            SET name = $2, price = $3, image_path = COALESCE($4, p.image_path), updated_at = now()
            FROM previous
            WHERE p.id = previous.id
            RETURNING p.id, p.name, p.price, p.image_path, p.created_at, p.updated_at,
                      previous.image_path AS previous_image_path
            "#,
        )
        .bind(id)
        .bind(fields.name)
        .bind(fields.price)
        .bind(image_path.as_deref())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(product_not_found)?;

        Ok(UpdatedProduct {
            replaced_image: displaced_image(row.previous_image_path, image_path.as_deref()),
            product: row.product,
        })
    }

    async fn delete(&self, id: i64) -> Result<Product, DatabaseError> {
        let sql = format!("DELETE FROM products WHERE id = $1 RETURNING {}", PRODUCT_COLUMNS);
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(product_not_found)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, user: NewUser) -> Result<User, DatabaseError> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    DatabaseError::Conflict(format!("a user with email '{}' already exists", user.email))
                }
                other => other.into(),
            })
    }
}

pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let inserted = sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        // Expired entries can no longer authenticate anything
        let purged = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!("Purged {} expired revocations", purged);
        }
        Ok(inserted == 1)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, DatabaseError> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?)
    }
}
