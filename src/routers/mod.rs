pub mod chat;
pub mod error;
pub mod health;
pub mod status;

pub use error::ApiError;
