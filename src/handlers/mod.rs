// handlers/mod.rs - request handlers
//
// Public:    /login
// Token:     /me, /logout, /refresh (resolve the bearer themselves)
// Protected: /products[/:id] (behind middleware::require_auth)
pub mod auth;
pub mod products;
