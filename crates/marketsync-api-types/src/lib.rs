//! Response shapes returned by the marketplace product endpoints.
//!
//! Field names follow the server's camelCase JSON. Every record keeps the fields it does not model
//! in `extra` so a round trip through the client cache never drops server data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub type ProductId = i64;
pub type UserId = i64;

/// Account that owns a listing or wrote a postscript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A listing together with its seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductWithUser {
    #[serde(flatten)]
    pub product: Product,
    pub user: User,
}

/// `GET /api/products/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetailSnapshot {
    pub ok: bool,
    pub product: ProductWithUser,
    #[serde(default)]
    pub related_product: Vec<Product>,
    /// The server spells this key `ReservedProduct`; both spellings are accepted.
    #[serde(default, alias = "ReservedProduct")]
    pub reserved_product: Vec<Product>,
    pub is_liked: bool,
    pub is_reserved: bool,
}

/// A review left on a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Postscript {
    pub id: i64,
    pub postscript: String,
    pub created_by: User,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /api/products/{id}/postscript`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostscriptsSnapshot {
    pub ok: bool,
    #[serde(default)]
    pub postscripts: Vec<Postscript>,
}
