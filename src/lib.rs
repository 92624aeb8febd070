// src/lib.rs — Library root for copilot-chat

pub mod chat;
pub mod cli;
pub mod infra;
pub mod probe;
pub mod sdk;
