//! Push delivery through Firebase Cloud Messaging.

pub mod auth;
pub mod credentials;
pub mod fcm;

pub use auth::AccessTokenSource;
pub use credentials::ServiceAccount;
pub use fcm::FcmProvider;
