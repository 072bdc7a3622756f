mod identity_provider_supabase;
mod wire;

pub use identity_provider_supabase::*;
