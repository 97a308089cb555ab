pub mod auth;
pub mod resource;

pub use auth::{AuthError, AuthGateway, CurrentUser};
pub use resource::{AsyncResource, ResourceOptions, ResourceState, SettlePolicy};
