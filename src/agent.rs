use crate::history::{ ConversationStore, QueryHistory };
use crate::llm::chat::{ ChatClient, ChatStream };
use crate::models::chat::{ MessageId, Role };
use crate::models::search::{ SearchRequest, SearchResult };
use crate::rag::ContextFormatter;
use crate::search::SearchClient;

use log::{ debug, info, warn };
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{ Arc, Mutex, MutexGuard };
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Searching,
    SearchFailed,
    Augmenting,
    Requesting,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Searching => "searching",
            TurnPhase::SearchFailed => "search-failed",
            TurnPhase::Augmenting => "augmenting",
            TurnPhase::Requesting => "requesting",
        };
        f.write_str(name)
    }
}

/// Everything the caller needs to drain the model response for a turn.
pub struct ModelDispatch {
    pub stream: ChatStream,
    pub user_message_id: MessageId,
    pub system_message_id: Option<MessageId>,
    pub results: Vec<SearchResult>,
}

impl fmt::Debug for ModelDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDispatch")
            .field("user_message_id", &self.user_message_id)
            .field("system_message_id", &self.system_message_id)
            .field("results", &self.results.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The search collaborator failed. Conversation and history are untouched.
    SearchFailed {
        message: String,
    },
    Dispatched(ModelDispatch),
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("A search is already in progress for this conversation")]
    Busy,
    #[error("Model request failed: {0}")]
    ModelRequest(Box<dyn StdError + Send + Sync>),
}

#[derive(Debug, Default)]
struct TurnState {
    phase: TurnPhase,
    loading: bool,
    error: Option<String>,
    results: Vec<SearchResult>,
    results_by_message: HashMap<MessageId, Vec<SearchResult>>,
    history: QueryHistory,
}

impl TurnState {
    fn enter(&mut self, phase: TurnPhase) {
        debug!("Turn phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn in_flight(&self) -> bool {
        !matches!(self.phase, TurnPhase::Idle | TurnPhase::SearchFailed)
    }
}

/// Returns the agent to `Idle` when a submit completes or its future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<TurnState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.loading = false;
        state.enter(TurnPhase::Idle);
    }
}

/// Sequences one retrieval-augmented turn: search, fold results into a
/// system message, then open the model stream over the full conversation.
pub struct SearchAgent {
    search_client: Arc<dyn SearchClient>,
    chat_client: Arc<dyn ChatClient>,
    formatter: ContextFormatter,
    state: Mutex<TurnState>,
}

impl SearchAgent {
    pub fn new(
        search_client: Arc<dyn SearchClient>,
        chat_client: Arc<dyn ChatClient>,
        formatter: ContextFormatter
    ) -> Self {
        Self {
            search_client,
            chat_client,
            formatter,
            state: Mutex::new(TurnState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TurnState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn submit(
        &self,
        input: &str,
        conversation: &ConversationStore
    ) -> Result<TurnOutcome, TurnError> {
        if input.trim().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let previous_queries = {
            let mut state = self.state();
            if state.in_flight() {
                return Err(TurnError::Busy);
            }
            state.enter(TurnPhase::Searching);
            state.loading = true;
            state.error = None;
            state.results.clear();
            state.history.window()
        };
        let _in_flight = InFlight { state: &self.state };

        let request = SearchRequest {
            query: input.to_string(),
            previous_queries,
        };
        let results = match self.search_client.search(&request).await {
            Ok(results) => results,
            Err(e) => {
                let message = e.to_string();
                warn!("Search failed for '{}': {}", input, message);
                let mut state = self.state();
                state.enter(TurnPhase::SearchFailed);
                state.error = Some(message.clone());
                state.loading = false;
                return Ok(TurnOutcome::SearchFailed { message });
            }
        };

        {
            let mut state = self.state();
            state.results = results.clone();
            state.loading = false;
            state.enter(TurnPhase::Augmenting);
        }

        let context = self.formatter.format(&results);
        let system_message_id = if context.is_empty() {
            debug!("No search results; sending the turn without context");
            None
        } else {
            Some(conversation.append(Role::System, context))
        };
        let user_message_id = conversation.append(Role::User, input);

        let messages = {
            let mut state = self.state();
            if !results.is_empty() {
                state.results_by_message.insert(user_message_id.clone(), results.clone());
            }
            state.enter(TurnPhase::Requesting);
            conversation.snapshot()
        };

        let stream = match self.chat_client.stream_chat(&messages).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = TurnError::ModelRequest(e);
                warn!("Turn not sent to {}: {}", self.chat_client.get_model(), err);
                self.state().error = Some(err.to_string());
                return Err(err);
            }
        };

        self.state().history.push(input);
        info!(
            "Turn dispatched: {} result(s), {} message(s) sent to {}",
            results.len(),
            messages.len(),
            self.chat_client.get_model()
        );

        Ok(
            TurnOutcome::Dispatched(ModelDispatch {
                stream,
                user_message_id,
                system_message_id,
                results,
            })
        )
    }

    pub fn phase(&self) -> TurnPhase {
        self.state().phase
    }

    /// Covers the search phase only, never generation.
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn current_results(&self) -> Vec<SearchResult> {
        self.state().results.clone()
    }

    pub fn results_for(&self, user_message_id: &str) -> Option<Vec<SearchResult>> {
        self.state().results_by_message.get(user_message_id).cloned()
    }

    pub fn query_history(&self) -> QueryHistory {
        self.state().history.clone()
    }

    /// Forgets history, results and errors, e.g. when a new conversation starts.
    pub fn reset(&self) {
        let mut state = self.state();
        if !state.in_flight() {
            *state = TurnState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ sample_result, ChatScript, ScriptedChatClient, ScriptedSearchClient };
    use crate::search::SearchError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::sync::{ oneshot, Mutex as AsyncMutex };

    fn agent(search: Arc<ScriptedSearchClient>, chat: Arc<ScriptedChatClient>) -> SearchAgent {
        SearchAgent::new(search, chat, ContextFormatter::default())
    }

    async fn drain(outcome: TurnOutcome) -> String {
        match outcome {
            TurnOutcome::Dispatched(dispatch) => {
                let chunks: Vec<_> = dispatch.stream.collect().await;
                chunks.into_iter().filter_map(Result::ok).collect()
            }
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let search = Arc::new(ScriptedSearchClient::default());
        let chat = Arc::new(ScriptedChatClient::chunks(&["x"]));
        let agent = agent(search.clone(), chat.clone());
        let store = ConversationStore::new();

        let outcome = agent.submit("   \n", &store).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Ignored));
        assert!(search.recorded().is_empty());
        assert!(chat.recorded().is_empty());
        assert!(store.is_empty());
        assert_eq!(agent.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn results_are_injected_ahead_of_the_user_message() {
        let search = Arc::new(ScriptedSearchClient::once(vec![sample_result(1), sample_result(2)]));
        let chat = Arc::new(ScriptedChatClient::chunks(&["ok"]));
        let agent = agent(search.clone(), chat.clone());
        let store = ConversationStore::new();

        let outcome = agent.submit("weather today", &store).await.unwrap();
        let dispatch = match outcome {
            TurnOutcome::Dispatched(d) => d,
            other => panic!("unexpected {:?}", other),
        };
        assert!(dispatch.system_message_id.is_some());
        assert_eq!(dispatch.results.len(), 2);

        let sent = &chat.recorded()[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains("[1] Result 1"));
        assert!(sent[0].content.contains("[2] Result 2"));
        assert_eq!(sent[1].role, Role::User);
        assert_eq!(sent[1].content, "weather today");

        assert_eq!(agent.results_for(&dispatch.user_message_id).unwrap().len(), 2);
        assert_eq!(agent.query_history().window(), vec!["weather today"]);
        assert!(!agent.is_loading());
        assert_eq!(agent.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn empty_results_skip_injection() {
        let search = Arc::new(ScriptedSearchClient::once(Vec::new()));
        let chat = Arc::new(ScriptedChatClient::chunks(&["ok"]));
        let agent = agent(search, chat.clone());
        let store = ConversationStore::new();

        let outcome = agent.submit("obscure", &store).await.unwrap();
        match &outcome {
            TurnOutcome::Dispatched(d) => assert!(d.system_message_id.is_none()),
            other => panic!("unexpected {:?}", other),
        }
        let sent = &chat.recorded()[0];
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].role, Role::User);
        assert!(store.snapshot().iter().all(|m| m.role != Role::System));
        assert_eq!(agent.query_history().len(), 1);
    }

    #[tokio::test]
    async fn failed_search_leaves_everything_untouched() {
        let search = Arc::new(ScriptedSearchClient::failing(503));
        let chat = Arc::new(ScriptedChatClient::chunks(&["never"]));
        let agent = agent(search, chat.clone());
        let store = ConversationStore::new();
        store.append(Role::User, "earlier");

        let outcome = agent.submit("weather today", &store).await.unwrap();
        let message = match outcome {
            TurnOutcome::SearchFailed { message } => message,
            other => panic!("unexpected {:?}", other),
        };
        assert!(message.contains("503"));
        assert_eq!(store.len(), 1);
        assert!(chat.recorded().is_empty());
        assert!(agent.query_history().is_empty());
        assert_eq!(agent.last_error(), Some(message));
        assert!(!agent.is_loading());
    }

    #[tokio::test]
    async fn error_clears_when_the_next_search_starts() {
        let search = Arc::new(
            ScriptedSearchClient::new(
                vec![Err(SearchError::Malformed("bad json".into())), Ok(vec![sample_result(1)])]
            )
        );
        let chat = Arc::new(ScriptedChatClient::chunks(&["fine"]));
        let agent = agent(search, chat);
        let store = ConversationStore::new();

        agent.submit("first", &store).await.unwrap();
        assert!(agent.last_error().unwrap().contains("bad json"));

        let outcome = agent.submit("second", &store).await.unwrap();
        assert_eq!(drain(outcome).await, "fine");
        assert_eq!(agent.last_error(), None);
        assert_eq!(agent.current_results().len(), 1);
    }

    #[tokio::test]
    async fn previous_queries_exclude_the_current_one() {
        let search = Arc::new(ScriptedSearchClient::default());
        let chat = Arc::new(
            ScriptedChatClient::new(
                (0..5).map(|_| ChatScript::Chunks(vec!["a".into()])).collect()
            )
        );
        let agent = agent(search.clone(), chat);
        let store = ConversationStore::new();

        for q in ["q1", "q2", "q3", "q4", "q5"] {
            let outcome = agent.submit(q, &store).await.unwrap();
            drain(outcome).await;
        }

        let requests = search.recorded();
        assert!(requests[0].previous_queries.is_empty());
        assert_eq!(requests[1].previous_queries, vec!["q1"]);
        assert_eq!(requests[4].query, "q5");
        assert_eq!(requests[4].previous_queries, vec!["q2", "q3", "q4"]);
        assert_eq!(agent.query_history().window(), vec!["q3", "q4", "q5"]);
    }

    #[tokio::test]
    async fn rejected_model_request_keeps_history_clean() {
        let search = Arc::new(ScriptedSearchClient::once(vec![sample_result(1)]));
        let chat = Arc::new(ScriptedChatClient::new(vec![ChatScript::Reject("401".into())]));
        let agent = agent(search, chat);
        let store = ConversationStore::new();

        let err = agent.submit("q", &store).await.unwrap_err();
        assert!(matches!(err, TurnError::ModelRequest(_)));
        assert!(agent.query_history().is_empty());
        assert_eq!(store.len(), 2);
        assert_eq!(agent.phase(), TurnPhase::Idle);
        assert_eq!(agent.last_error().as_deref(), Some("Model request failed: 401"));
    }

    struct GatedSearch {
        gate: AsyncMutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl SearchClient for GatedSearch {
        async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
            let gate = self.gate.lock().await.take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            Ok(vec![sample_result(1)])
        }
    }

    #[tokio::test]
    async fn second_submit_while_searching_is_busy() {
        let (open, gate) = oneshot::channel();
        let search = Arc::new(GatedSearch { gate: AsyncMutex::new(Some(gate)) });
        let chat = Arc::new(ScriptedChatClient::chunks(&["done"]));
        let agent = Arc::new(SearchAgent::new(search, chat, ContextFormatter::default()));
        let store = ConversationStore::new();

        let first = {
            let agent = agent.clone();
            let store = store.clone();
            tokio::spawn(async move { agent.submit("first", &store).await })
        };
        while !agent.is_loading() {
            tokio::task::yield_now().await;
        }
        assert_eq!(agent.phase(), TurnPhase::Searching);

        let second = agent.submit("second", &store).await;
        assert!(matches!(second, Err(TurnError::Busy)));

        open.send(()).unwrap();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(drain(outcome).await, "done");
        assert_eq!(agent.query_history().window(), vec!["first"]);
    }

    #[tokio::test]
    async fn dropped_submit_does_not_wedge_the_agent() {
        let (_open, gate) = oneshot::channel::<()>();
        let search = Arc::new(GatedSearch { gate: AsyncMutex::new(Some(gate)) });
        let chat = Arc::new(ScriptedChatClient::chunks(&["later"]));
        let agent = SearchAgent::new(search, chat, ContextFormatter::default());
        let store = ConversationStore::new();

        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            agent.submit("stuck", &store)
        ).await;
        assert!(stalled.is_err());
        assert!(!agent.is_loading());
        assert_eq!(agent.phase(), TurnPhase::Idle);

        let outcome = agent.submit("retry", &store).await.unwrap();
        assert_eq!(drain(outcome).await, "later");
    }

    #[tokio::test]
    async fn reset_forgets_turn_state() {
        let search = Arc::new(ScriptedSearchClient::once(vec![sample_result(1)]));
        let chat = Arc::new(ScriptedChatClient::chunks(&["x"]));
        let agent = agent(search, chat);
        let store = ConversationStore::new();
        drain(agent.submit("q", &store).await.unwrap()).await;

        agent.reset();
        assert!(agent.query_history().is_empty());
        assert!(agent.current_results().is_empty());
    }
}
