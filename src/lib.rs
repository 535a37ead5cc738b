pub mod cache;
pub mod config;
pub mod database;
pub mod inspect;
pub mod record;
pub mod storage;
