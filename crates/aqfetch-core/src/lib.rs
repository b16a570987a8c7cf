pub mod config;
pub mod error;
pub mod fetch;
pub mod generic;
pub mod http;
pub mod measurand;
pub mod measures;
pub mod processor;
pub mod secrets;
pub mod station;
pub mod storage;
pub mod units;
pub mod version;
