use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Search Provider Args ---
    /// Search endpoint that accepts POST {query, previousQueries} and returns {results}
    #[arg(long, env = "SEARCH_URL", default_value = "http://127.0.0.1:3000/api/search")]
    pub search_url: String,

    /// Optional bearer token for the search endpoint
    #[arg(long, env = "SEARCH_API_KEY")]
    pub search_api_key: Option<String>,

    /// Timeout in seconds for a single search request
    #[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value = "30")]
    pub search_timeout_secs: u64,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (ollama, openai, deepseek, groq, xai, together)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "ollama")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (required for every provider except Ollama)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., deepseek-r1:7b, deepseek-ai/DeepSeek-R1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Sampling temperature passed to the model
    #[arg(long, env = "CHAT_TEMPERATURE")]
    pub temperature: Option<f32>,

    // --- Prompt & Rendering Args ---
    /// Optional JSON file overriding the search-context prompt templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Extra system prompt placed at the start of every conversation
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Marker that opens the model's reasoning segment
    #[arg(long, env = "THINK_START", default_value = "<think>")]
    pub think_start: String,

    /// Marker that closes the model's reasoning segment
    #[arg(long, env = "THINK_END", default_value = "</think>")]
    pub think_end: String,

    /// Do not print the model's reasoning segment
    #[arg(long, env = "HIDE_THINKING", default_value = "false")]
    pub hide_thinking: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR", default_value = "false")]
    pub no_color: bool,

    // --- General App Args ---
    /// Run a single turn with this query and exit
    #[arg(short = 'q', long)]
    pub query: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
