pub mod app;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod models;
pub mod preferences;
pub mod storage;
pub mod tmdb;
pub mod views;
pub mod watchlist;
