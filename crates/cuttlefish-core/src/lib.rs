//! Cuttlefish core library
//!
//! Conversation storage, the completion stream client, the tool registry and
//! built-in tools, and the agent loop that ties them together. Presentation
//! layers (the CLI) drive everything through [`app::App`].

pub mod agent;
pub mod ai;
pub mod app;
pub mod constants;
pub mod paths;
pub mod settings;
pub mod storage;
pub mod tools;

pub use agent::{AppEvent, EventSender, GenerationError};
pub use app::App;
pub use settings::AppSettings;
