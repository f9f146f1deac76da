pub mod product;
pub mod user;

pub use product::{Product, ProductFields, ProductForm};
pub use user::{NewUser, User, UserProfile};
