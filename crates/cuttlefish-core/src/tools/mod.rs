//! Tool registry and built-in tools

pub mod implementations;
pub mod registry;

pub use registry::{
    parse_args, AvailableTool, RunResult, Tool, ToolDescription, ToolInstance, ToolRegistry,
};
