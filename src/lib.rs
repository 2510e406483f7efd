pub mod app;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dates;
pub mod models;
pub mod rollups;
pub mod storage;
pub mod timer;
pub mod tracker;
pub mod ui;
