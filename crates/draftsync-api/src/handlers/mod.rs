//! HTTP request handlers

pub mod courses;
pub mod health;
pub mod registry;
pub mod upload;
