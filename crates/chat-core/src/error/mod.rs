//! Domain errors

mod payload_error;

pub use payload_error::{PayloadError, PayloadResult};
