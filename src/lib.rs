pub mod browser;
pub mod bypass;
pub mod config;
pub mod crawler;
pub mod db;
pub mod error;
pub mod helpers;
pub mod lazy;
pub mod media;
pub mod models;
pub mod parser;
pub mod pattern;
