mod credential;
mod outcome;
mod session;
mod user;

pub use credential::*;
pub use outcome::*;
pub use session::*;
pub use user::*;
