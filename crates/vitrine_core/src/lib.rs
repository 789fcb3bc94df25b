pub mod api;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod histogram;
pub mod request;
pub mod response;
pub mod schema;

pub use api::*;
pub use entity::*;
pub use error::{VitrineError, VitrineResult};
pub use hierarchy::*;
pub use histogram::build_histogram;
pub use request::*;
pub use response::*;
pub use schema::*;
