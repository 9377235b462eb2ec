pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod types;

pub use error::OmsError;
pub use service::Controller;
