pub mod account;
pub mod offer;
pub mod order;
pub mod platform;
pub mod subscription;
pub mod warehouse;

pub use account::*;
pub use offer::*;
pub use order::*;
pub use platform::*;
pub use subscription::*;
pub use warehouse::*;
