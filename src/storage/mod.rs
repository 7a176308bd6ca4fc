pub mod store;
pub mod types;

pub use store::CredentialStore;
pub use types::{
    AuthConfig, AuthUpdate, MultiPlatformConfig, Organization, OrganizationRole, PlatformEntry,
    PlatformInfo, PlatformListing,
};
