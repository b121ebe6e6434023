//! Data models for the deployment service.
//!
//! Field names follow the JSON contract of the deploy API and the callback receiver.

mod artifact;
mod callback;
mod record;
mod request;

pub use artifact::*;
pub use callback::*;
pub use record::*;
pub use request::*;
