mod auth_service;
mod oauth_service;
mod token_reconciler;

pub use auth_service::*;
pub use oauth_service::*;
pub use token_reconciler::*;
