pub mod bundle;
pub mod cache;
pub mod destination;
pub mod error;
pub mod secret;
pub mod store;
