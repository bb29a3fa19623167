//! Shared identity types, configuration, and error kinds for the fulcrum
//! registry workspace.
pub mod config;
pub mod context;
pub mod error;
pub mod ids;

#[cfg(feature = "server")]
pub mod logging;

pub use config::RegistryConfig;
pub use context::PlayerRequestContext;
pub use error::ProtocolViolation;
pub use error::RegistryError;
pub use error::RegistryResult;
pub use error::StoreError;
pub use ids::BackendId;
pub use ids::FamilyId;
pub use ids::PlayerId;
pub use ids::ProxyId;
pub use ids::SlotId;
pub use ids::Unique;
pub use ids::VariantId;
pub use ids::ID;
