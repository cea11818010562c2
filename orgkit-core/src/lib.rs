pub mod common;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod policy;
pub mod postgres_common;
