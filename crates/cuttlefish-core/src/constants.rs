//! Application-wide constants

/// Completion request parameters
pub mod ai {
    pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
    pub const MAX_OUTPUT_TOKENS: usize = 500;
    pub const TEMPERATURE: f32 = 0.7;
    pub const TOP_P: f32 = 1.0;

    /// Stop sequences for the first completion attempt of a run.
    pub const DEFAULT_STOP_SEQUENCES: [&str; 2] = ["Observation", "Response"];

    /// Empty completions tolerated per run; the one reaching this count aborts it.
    pub const MAX_COMPLETION_ATTEMPTS: usize = 3;
}

/// Paths and file names
pub mod app {
    pub const CONFIG_DIR_NAME: &str = ".cuttlefish";
    pub const DATABASE_FILE_NAME: &str = "data.db";
    pub const SETTINGS_KEY: &str = "settings";
    pub const MASKED_API_KEY: &str = "*****";
    pub const DEFAULT_PYTHON_INTERPRETER: &str = "python3";
}

/// Conversation defaults
pub mod conversation {
    /// Titles longer than this are shortened when a conversation is created.
    pub const TITLE_MAX_CHARS: usize = 20;
    /// Characters kept from the first message when the title is shortened.
    pub const TITLE_TRUNCATED_CHARS: usize = 13;

    pub const DEFAULT_TOOLS_ENABLED: [&str; 4] = ["terminal", "python", "get_url", "chart"];
}
