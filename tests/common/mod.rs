#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};

use product_api::auth::PasswordHasher;
use product_api::config::{AppConfig, DevUserConfig};
use product_api::database::memory::{MemoryProductRepository, MemoryRevocationStore, MemoryUserRepository};
use product_api::server::{app, AppState, Backend};
use product_api::storage::MemoryImageStore;

pub const USER_NAME: &str = "Test User";
pub const USER_EMAIL: &str = "tester@example.com";
pub const USER_PASSWORD: &str = "correct horse battery staple";

/// A server running inside the test process on its own port, with
/// in-memory storage so every test starts from an empty catalogue.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub images: Arc<MemoryImageStore>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.security.enable_cors = false;
    config
}

pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(test_config()).await
}

pub async fn spawn_server_with(config: AppConfig) -> Result<TestServer> {
    let images = Arc::new(MemoryImageStore::new(config.storage.image_dir.clone()));
    let backend = Backend {
        users: Arc::new(MemoryUserRepository::new()),
        revocations: Arc::new(MemoryRevocationStore::new()),
        products: Arc::new(MemoryProductRepository::new()),
        images: images.clone(),
    };

    // Cheap argon2 parameters keep the suite fast
    let hasher = PasswordHasher::new(1024, 1, 1)?;
    let state = AppState::new(backend, &config, hasher)?;
    state
        .seed_user(&DevUserConfig {
            name: USER_NAME.to_string(),
            email: USER_EMAIL.to_string(),
            password: USER_PASSWORD.to_string(),
        })
        .await?;

    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;

    let router = app(state, &config);
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let server = TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?,
        images,
        task,
    };
    Ok(server)
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login_with(&self, email: &str, password: &str) -> Result<(StatusCode, Value)> {
        let res = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = res.status();
        Ok((status, res.json().await?))
    }

    /// Log in as the seeded user and return the bearer token.
    pub async fn token(&self) -> Result<String> {
        let (status, body) = self.login_with(USER_EMAIL, USER_PASSWORD).await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} {}", status, body);
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("login response carried no token")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.post(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }

    /// PUT without any body
    pub async fn put(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        read(self.client.put(self.url(path)).bearer_auth(token).send().await?).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        read(self.client.delete(self.url(path)).bearer_auth(token).send().await?).await
    }

    pub async fn post_form(&self, path: &str, token: &str, form: Form) -> Result<(StatusCode, Value)> {
        read(
            self.client
                .post(self.url(path))
                .bearer_auth(token)
                .multipart(form)
                .send()
                .await?,
        )
        .await
    }

    pub async fn put_form(&self, path: &str, token: &str, form: Form) -> Result<(StatusCode, Value)> {
        read(
            self.client
                .put(self.url(path))
                .bearer_auth(token)
                .multipart(form)
                .send()
                .await?,
        )
        .await
    }

    pub async fn put_json(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        read(
            self.client
                .put(self.url(path))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?,
        )
        .await
    }

    /// Create a product through the API and return its `produto` object.
    pub async fn create_product(&self, token: &str, name: &str, price: &str, file: Option<&str>) -> Result<Value> {
        let (status, body) = self.post_form("/products", token, product_form(name, price, file)).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create failed: {} {}", status, body);
        Ok(body["data"]["produto"].clone())
    }
}

async fn read(res: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = res.status();
    let body = res.json::<Value>().await.context("response body was not JSON")?;
    Ok((status, body))
}

/// Multipart body with `name`, `price` and optionally a small `file` part.
pub fn product_form(name: &str, price: &str, file: Option<&str>) -> Form {
    let form = Form::new()
        .text("name", name.to_string())
        .text("price", price.to_string());
    match file {
        Some(filename) => form.part("file", image_part(filename, b"\x89PNG fake image bytes".to_vec())),
        None => form,
    }
}

pub fn image_part(filename: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes).file_name(filename.to_string())
}

pub fn assert_error(status: StatusCode, body: &Value, expected_status: StatusCode, code: &str) {
    assert_eq!(status, expected_status, "unexpected status, body: {}", body);
    assert_eq!(body["status"], "error", "body: {}", body);
    assert_eq!(body["code"], code, "body: {}", body);
    assert!(body["message"].is_string(), "body: {}", body);
}
