pub mod oms;

pub use oms::*;
