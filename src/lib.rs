pub mod config;
pub mod dispatch;
pub mod models;
pub mod storage;
pub mod tracking;
