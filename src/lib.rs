pub mod accession;
pub mod app;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod output;
pub mod runlog;
pub mod transfer;
