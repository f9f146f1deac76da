//! In-process implementations of the repository traits, used when no
//! `DATABASE_URL` is configured and by the test suites.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::database::manager::DatabaseError;
use crate::database::models::{NewUser, Product, ProductFields, User};
use crate::database::repository::{
    displaced_image, ProductRepository, RevocationStore, UpdatedProduct, UserRepository, PRODUCT_NOT_FOUND,
};

#[derive(Default)]
struct ProductTable {
    next_id: i64,
    rows: BTreeMap<i64, Product>,
}

#[derive(Default)]
pub struct MemoryProductRepository {
    table: RwLock<ProductTable>,
}

impl MemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn product_not_found() -> DatabaseError {
    DatabaseError::NotFound(PRODUCT_NOT_FOUND.to_string())
}

#[async_trait]
impl ProductRepository for MemoryProductRepository {
    async fn list(&self) -> Result<Vec<Product>, DatabaseError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Product, DatabaseError> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(product_not_found)
    }

    async fn create(&self, fields: ProductFields, image_path: Option<String>) -> Result<Product, DatabaseError> {
        let mut table = self.table.write().await;
        table.next_id += 1;

        let now = Utc::now();
        let product = Product {
            id: table.next_id,
            name: fields.name,
            price: fields.price,
            image_path,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        id: i64,
        fields: ProductFields,
        image_path: Option<String>,
    ) -> Result<UpdatedProduct, DatabaseError> {
        let mut table = self.table.write().await;
        let product = table.rows.get_mut(&id).ok_or_else(product_not_found)?;

        let previous = product.image_path.clone();
        product.name = fields.name;
        product.price = fields.price;
        if image_path.is_some() {
            product.image_path = image_path.clone();
        }
        product.updated_at = Utc::now();

        Ok(UpdatedProduct {
            product: product.clone(),
            replaced_image: displaced_image(previous, image_path.as_deref()),
        })
    }

    async fn delete(&self, id: i64) -> Result<Product, DatabaseError> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .ok_or_else(product_not_found)
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<BTreeMap<i64, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(DatabaseError::Conflict(format!(
                "a user with email '{}' already exists",
                user.email
            )));
        }

        let id = users.keys().next_back().copied().unwrap_or(0) + 1;
        let created = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        users.insert(id, created.clone());
        Ok(created)
    }
}

#[derive(Default)]
pub struct MemoryRevocationStore {
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let mut revoked = self.revoked.write().await;
        let now = Utc::now();
        revoked.retain(|_, expiry| *expiry >= now);
        Ok(revoked.insert(jti.to_string(), expires_at).is_none())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, DatabaseError> {
        Ok(self.revoked.read().await.contains_key(jti))
    }
}
