pub mod abi;
pub mod config;
pub mod error;
pub mod integrity;
pub mod pipeline;
pub mod query;
pub mod rpc;
pub mod session;
pub mod tracker;
