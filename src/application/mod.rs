pub mod allocator;
pub mod checkout;
pub mod import_cost;
pub mod subscriptions;

pub use allocator::*;
pub use checkout::*;
pub use import_cost::*;
pub use subscriptions::*;
