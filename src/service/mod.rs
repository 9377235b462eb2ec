pub mod aggregation;
pub mod controller;
pub mod gs1;
pub mod report;

pub use controller::{Controller, OrdersView};
