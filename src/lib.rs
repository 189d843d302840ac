//! quillpress - A server-rendered blog with a media CDN client
//!
//! Posts with categories and tags, threaded comments, likes, an admin panel
//! and a contact inbox, served by axum over SQLite.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod web;
