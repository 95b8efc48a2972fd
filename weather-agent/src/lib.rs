//! Weather Agent core library.

pub mod agent;
pub mod chat;
pub mod config;
pub mod constant;
pub mod exception;
pub mod llm;
pub mod share;
pub mod tools;
pub mod utils;

pub mod app;
pub mod cli;
pub mod repl;
