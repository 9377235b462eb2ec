pub mod oms_api;

pub use oms_api::{CLIENT_TOKEN_HEADER, OmsApi, OmsTarget};
