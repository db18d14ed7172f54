pub mod user_operation;
pub(crate) mod utils;
