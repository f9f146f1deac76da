// handlers/products.rs - product CRUD behind the bearer-token guard
//
// Each mutating action runs: validate -> check upload -> store image ->
// persist -> envelope. A stored image is removed again if persisting fails.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartError},
        FromRequest, Path, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::database::models::{Product, ProductForm};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Message};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub produto: Product,
}

#[derive(Debug, Serialize)]
pub struct UpdatedProductResponse {
    pub produto_atualizado: Product,
}

/// File part of a multipart submission
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// Product submission, from `multipart/form-data` (`name`, `price`, `file`)
/// or from a JSON body (`name`, `price`; no file).
#[derive(Debug)]
pub struct ProductInput {
    pub form: ProductForm,
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Deserialize)]
struct ProductBody {
    name: Option<String>,
    price: Option<Value>,
}

#[async_trait]
impl<S> FromRequest<S> for ProductInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return read_multipart(multipart).await;
        }

        let Json(body) = Json::<ProductBody>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        Ok(Self {
            form: ProductForm::new(body.name, body.price.and_then(price_text)),
            file: None,
        })
    }
}

/// JSON clients may send the price as a number or as a string.
fn price_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ProductInput, ApiError> {
    let mut name = None;
    let mut price = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await.map_err(multipart_error)?),
            Some("price") => price = Some(field.text().await.map_err(multipart_error)?),
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // browsers send an empty part when no file was picked
                if !filename.is_empty() || !bytes.is_empty() {
                    file = Some(UploadedFile { filename, bytes });
                }
            }
            _ => {}
        }
    }

    Ok(ProductInput {
        form: ProductForm::new(name, price),
        file,
    })
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Route ids that are not integers cannot name a product.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::product_not_found())
}

/// Check the upload against the allow-list, then store it.
async fn accept_upload(state: &AppState, file: Option<UploadedFile>) -> Result<Option<String>, ApiError> {
    let Some(file) = file else {
        return Ok(None);
    };

    let extension = state.uploads.check_extension(&file.filename).map_err(|e| {
        tracing::debug!("Rejected upload '{}': {}", file.filename, e);
        ApiError::from(e)
    })?;

    Ok(Some(state.images.put(&extension, file.bytes).await?))
}

async fn discard_image(state: &AppState, path: Option<&str>) {
    if let Some(path) = path {
        if let Err(e) = state.images.remove(path).await {
            tracing::warn!("Failed to remove image {}: {}", path, e);
        }
    }
}

/// GET /products
pub async fn index(State(state): State<AppState>) -> ApiResult<Vec<Product>> {
    Ok(ApiResponse::success(state.products.list().await?))
}

/// GET /products/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ProductResponse> {
    let produto = state.products.get(parse_id(&id)?).await?;
    Ok(ApiResponse::success(ProductResponse { produto }))
}

/// POST /products
pub async fn store(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    input: ProductInput,
) -> ApiResult<ProductResponse> {
    let fields = input.form.validated()?;
    let image_path = accept_upload(&state, input.file).await?;

    let produto = match state.products.create(fields, image_path.clone()).await {
        Ok(product) => product,
        Err(e) => {
            discard_image(&state, image_path.as_deref()).await;
            return Err(e.into());
        }
    };

    tracing::info!("User {} created product {}", auth.user.id, produto.id);
    Ok(ApiResponse::created(ProductResponse { produto }))
}

/// PUT /products/:id
///
/// The id is resolved before the body is looked at, so a missing product
/// is `not_found` whatever was submitted.
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    input: Result<ProductInput, ApiError>,
) -> ApiResult<UpdatedProductResponse> {
    let id = parse_id(&id)?;
    state.products.get(id).await?;

    let input = input?;
    let fields = input.form.validated()?;
    let image_path = accept_upload(&state, input.file).await?;

    let updated = match state.products.update(id, fields, image_path.clone()).await {
        Ok(updated) => updated,
        Err(e) => {
            discard_image(&state, image_path.as_deref()).await;
            return Err(e.into());
        }
    };
    discard_image(&state, updated.replaced_image.as_deref()).await;

    tracing::info!("User {} updated product {}", auth.user.id, id);
    Ok(ApiResponse::success(UpdatedProductResponse {
        produto_atualizado: updated.product,
    }))
}

/// DELETE /products/:id
pub async fn destroy(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let id = parse_id(&id)?;
    let removed = state.products.delete(id).await?;
    discard_image(&state, removed.image_path.as_deref()).await;

    tracing::info!("User {} deleted product {}", auth.user.id, id);
    Ok(ApiResponse::success(Message::new(format!("Product {} deleted.", id))))
}
