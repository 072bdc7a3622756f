mod auth_service_impl;
mod oauth_service_impl;
mod timeout;
mod token_reconciler_impl;

pub use auth_service_impl::*;
pub use oauth_service_impl::*;
pub use timeout::DEFAULT_CALL_TIMEOUT;
pub use token_reconciler_impl::*;
