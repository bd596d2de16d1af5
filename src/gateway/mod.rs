//! Gateways to the hosted backend: identity, relational data and object storage.

pub mod auth;
pub mod data;
pub mod files;

pub use auth::{
    AuthChangeEvent, AuthGateway, AuthStateChange, AuthSubscription, IdentityChanges,
    IdentityProvider,
};
pub use data::DataGateway;
pub use files::FileGateway;
