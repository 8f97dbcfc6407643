pub mod delegation;
pub mod interest;
pub mod store;
pub mod sync;
