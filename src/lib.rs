//! Folio - a small content management system
//!
//! This library provides the core functionality for the Folio CMS:
//! posts with categories and tags, threaded comments with moderation,
//! and per-post engagement tracking (views, ratings, comment votes).

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
