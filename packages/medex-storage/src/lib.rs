pub mod appointments;
pub mod db;
pub mod exports;
pub mod history;
pub mod models;
pub mod patients;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
