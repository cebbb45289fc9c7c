pub mod cli;
pub mod commands;
pub mod config;
pub mod identity;
pub mod launcher;
pub mod lifecycle;
pub mod platform;
pub mod projects;
pub mod template;
pub mod ui;
