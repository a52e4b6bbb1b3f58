//! Built-in tools
//!
//! - terminal: run bash commands, optionally behind user approval
//! - python: run python snippets
//! - search: Google Custom Search
//! - get_url: fetch a page's main text
//! - generate_image: OpenAI image generation
//! - chart: pass ECharts options to the UI

pub mod chart;
pub mod generate_image;
pub mod get_url;
mod process;
pub mod python;
pub mod search;
pub mod terminal;

use std::sync::Arc;

pub use chart::ChartTool;
pub use generate_image::GenerateImageTool;
pub use get_url::GetUrlTool;
pub use python::PythonTool;
pub use search::SearchTool;
pub use terminal::TerminalTool;

use super::registry::{Tool, ToolRegistry};

impl ToolRegistry {
    /// Registry with every built-in tool
    pub fn with_builtin_tools() -> Self {
        Self::new([
            Arc::new(TerminalTool) as Arc<dyn Tool>,
            Arc::new(PythonTool),
            Arc::new(SearchTool),
            Arc::new(GetUrlTool),
            Arc::new(GenerateImageTool),
            Arc::new(ChartTool),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_and_names() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(registry.len(), 6);
        let tools: Vec<(String, String)> = registry
            .available_tools()
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();
        assert_eq!(
            tools,
            vec![
                ("chart".to_string(), "Chart".to_string()),
                ("generate_image".to_string(), "Image Generator".to_string()),
                ("python".to_string(), "Python".to_string()),
                ("search".to_string(), "Search".to_string()),
                ("terminal".to_string(), "Terminal".to_string()),
                ("get_url".to_string(), "URL Getter".to_string()),
            ]
        );
    }
}
