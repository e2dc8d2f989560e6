pub mod app;
pub mod download;
pub mod extract;
