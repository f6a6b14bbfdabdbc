pub mod config;
pub mod crypto;
pub mod paypal;
pub mod postgres_catalog_repo;
pub mod postgres_order_repo;
pub mod postgres_subscription_repo;
pub mod repository;

pub use config::*;
pub use crypto::*;
pub use paypal::*;
pub use postgres_catalog_repo::*;
pub use postgres_order_repo::*;
pub use postgres_subscription_repo::*;
pub use repository::*;
