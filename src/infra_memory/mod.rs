mod identity_provider_memory;
mod password;

pub use identity_provider_memory::*;
