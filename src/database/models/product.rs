use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use validator::Validate;

use crate::validation::{self, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Largest price the `NUMERIC(12, 2)` column holds
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Validated attributes written on create and update
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub name: String,
    pub price: Decimal,
}

/// Product attributes as submitted, before validation
#[derive(Debug, Default, Clone, Validate)]
pub struct ProductForm {
    #[validate(required(message = "The product name is required."))]
    pub name: Option<String>,
    #[validate(required(message = "The product price is required."))]
    pub price: Option<String>,
}

impl ProductForm {
    pub fn new(name: Option<String>, price: Option<String>) -> Self {
        Self {
            name: validation::normalize(name),
            price: validation::normalize(price),
        }
    }

    /// Apply the rule set; prices are kept to cents.
    pub fn validated(&self) -> Result<ProductFields, FieldErrors> {
        let mut errors = validation::validate(self).err().unwrap_or_default();

        let price = match self.price.as_deref().map(Decimal::from_str) {
            Some(Ok(price)) if price < Decimal::ZERO => {
                errors.add("price", "The product price must not be negative.");
                None
            }
            Some(Ok(price)) if price.round_dp(2) > MAX_PRICE => {
                errors.add("price", format!("The product price must not exceed {}.", MAX_PRICE));
                None
            }
            // abs() only clears the sign of "-0" here
            Some(Ok(price)) => Some(price.abs().round_dp(2)),
            Some(Err(_)) => {
                errors.add("price", "The product price must be a number.");
                None
            }
            None => None,
        };

        match (self.name.clone(), price) {
            (Some(name), Some(price)) if errors.is_empty() => Ok(ProductFields { name, price }),
            _ => Err(errors),
        }
    }
}
