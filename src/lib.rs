pub mod agent;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod mock;
pub mod models;
pub mod rag;
pub mod render;
pub mod search;
pub mod segment;
pub mod session;
pub mod stream;

use agent::SearchAgent;
use cli::Args;
use config::prompt;
use llm::{ chat::new_client as new_chat_client, LlmConfig, LlmType };
use log::info;
use rag::ContextFormatter;
use render::Renderer;
use search::HttpSearchClient;
use segment::Markers;
use session::{ ChatSession, TurnStatus };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub fn build_agent(args: &Args) -> Result<SearchAgent, Box<dyn Error + Send + Sync>> {
    let chat_llm_type: LlmType = args.chat_llm_type.parse()?;
    let chat_api_key = if !args.chat_api_key.is_empty() {
        Some(args.chat_api_key.clone())
    } else {
        None
    };
    let chat_config = LlmConfig {
        llm_type: chat_llm_type,
        api_key: chat_api_key,
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        temperature: args.temperature,
        markers: markers(args),
    };
    let chat_client = new_chat_client(&chat_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={}",
        chat_llm_type,
        chat_client.get_model(),
        chat_client.get_base_url().as_deref().unwrap_or("adapter default")
    );

    let search_client = HttpSearchClient::new(
        &args.search_url,
        args.search_api_key.clone(),
        Duration::from_secs(args.search_timeout_secs)
    )?;
    let prompts = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;

    Ok(SearchAgent::new(Arc::new(search_client), chat_client, ContextFormatter::new(prompts)))
}

pub fn markers(args: &Args) -> Markers {
    Markers::new(args.think_start.clone(), args.think_end.clone())
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Search URL: {}", args.search_url);
    info!("Search Auth: {}", if args.search_api_key.is_some() { "bearer" } else { "none" });
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Reasoning Markers: {} {}", args.think_start, args.think_end);
    info!("Show Thinking: {}", !args.hide_thinking);
    info!("-------------------------");

    let agent = Arc::new(build_agent(&args)?);
    let renderer = Renderer {
        color: !args.no_color,
        show_thinking: !args.hide_thinking,
        markers: markers(&args),
    };
    let mut session = ChatSession::new(agent, renderer, args.system_prompt.clone(), std::io::stdout());

    if let Some(query) = &args.query {
        return match session.run_turn(query).await? {
            TurnStatus::SearchFailed(message) | TurnStatus::Failed(message) => Err(message.into()),
            TurnStatus::Answered | TurnStatus::Ignored => Ok(()),
        };
    }

    println!("Type a question, or /help for commands.");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    session.run(stdin).await
}
