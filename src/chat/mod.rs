// src/chat/mod.rs — Chat session shim over the vendor SDK

pub mod app;
pub mod message;
pub mod models;
pub mod reducer;
pub mod session;

pub use app::App;
pub use message::{ChatUpdate, Message, Role};
pub use models::{default_model, partition_models, ModelTiers};
pub use session::{ChatSession, UpdateCallback};
