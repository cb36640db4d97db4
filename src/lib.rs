pub mod app;
pub mod classify;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod ingest;
pub mod mail;
pub mod storage;
pub mod types;
pub mod unsubscribe;
