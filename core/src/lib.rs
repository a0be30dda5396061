pub mod catalog;
pub mod db;
pub mod docstore;
pub mod edamam;
pub mod error;
pub mod identity;
pub mod mirror;
pub mod models;
pub mod state;
pub mod sync;
pub mod tasks;
