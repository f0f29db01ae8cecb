//! fulltext - searchable text extraction for files referenced by database rows.
//!
//! The worker walks configured MySQL databases, claims one row at a time whose
//! full-text column is still empty, downloads the referenced file, extracts and
//! normalizes its text, and writes the result (or a status placeholder) back.

pub mod cli;
pub mod config;
pub mod extract;
pub mod ocr;
pub mod repository;
pub mod services;
pub mod text;
pub mod work_queue;
