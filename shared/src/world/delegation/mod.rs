mod authority_manager;
mod authority_state;
mod error;

pub use authority_manager::AuthorityManager;
pub use authority_state::{AuthorityState, AuthorityTransition};
pub use error::AuthorityError;
