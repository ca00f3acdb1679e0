// Library root
// -----------
// Admin client for the vendor-pricing backend. The binary (`main.rs`) loads
// configuration, builds an `ApiClient` and hands it to the menu loop in `ui`.
//
// Module responsibilities:
// - `jsonapi`: JSON:API document types and the relationship resolver that
//   flattens `included` into nested records.
// - `pricing`: rebuilds typed pricing entries from resolved records.
// - `api`: HTTP interactions with the backend; `auth` fetches and caches
//   the OAuth token it sends.
// - `customers`, `products`: the customer hierarchy and new-product flows.
// - `cache`, `files`, `config`, `models`, `error`: supporting pieces.
// - `ui`: terminal menus; delegates every request to `api`.
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod customers;
pub mod error;
pub mod files;
pub mod jsonapi;
pub mod models;
pub mod pricing;
pub mod products;
pub mod ui;
