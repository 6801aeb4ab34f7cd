pub mod error;

pub use error::{success_response, ErrorResponse};
