//! Chat sessions: transcript, filter selection and the per-turn state machine.
//!
//! Each session allows one in-flight message at a time (`Idle` ->
//! `AwaitingReply` -> `Idle`). Sessions share nothing but the agent and the
//! read-only property store.

mod filters;
mod transcript;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agent::{Agent, AgentReply};

pub use filters::{
    FilterSelection, FilterUpdate, InvalidFilter, BATHROOM_RANGE, BEDROOM_RANGE, PRICE_RANGE,
};
pub use transcript::{Speaker, Transcript, Turn};

/// Opening message shown above an empty transcript.
pub const GREETING: &str = "As-salamu alaykum! I'm your Islamic Real Estate Assistant. \
How can I help you find your perfect halal home today?";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("a reply is already in progress for this session")]
    Busy,

    #[error("message content is required")]
    EmptyMessage,

    #[error(transparent)]
    InvalidArgument(#[from] InvalidFilter),

    #[error("reply task failed: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

/// Proof that a turn was started; ties the reply to the transcript it was
/// computed from.
#[derive(Debug)]
pub struct TurnTicket {
    epoch: u64,
    history: Vec<Turn>,
    filters: FilterSelection,
}

/// State of one conversation.
#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    transcript: Transcript,
    filters: FilterSelection,
    state: TurnState,
    /// Bumped on every clear so late replies can be discarded.
    epoch: u64,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub greeting: &'static str,
    pub state: TurnState,
    pub transcript: Vec<Turn>,
    pub filters: FilterSelection,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Result of submitting a message.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub reply: AgentReply,
    /// Whether the exchange was appended to the transcript
    pub recorded: bool,
    pub transcript_len: usize,
}

impl ChatSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transcript: Transcript::new(),
            filters: FilterSelection::default(),
            state: TurnState::Idle,
            epoch: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn filters(&self) -> &FilterSelection {
        &self.filters
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Idle and untouched since before `cutoff`.
    fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.state == TurnState::Idle && self.last_activity < cutoff
    }

    /// Move to `AwaitingReply`, capturing the context for the agent.
    pub fn begin_turn(&mut self) -> Result<TurnTicket, SessionError> {
        if self.state == TurnState::AwaitingReply {
            return Err(SessionError::Busy);
        }
        self.state = TurnState::AwaitingReply;
        Ok(TurnTicket {
            epoch: self.epoch,
            history: self.transcript.turns().to_vec(),
            filters: self.filters.clone(),
        })
    }

    /// Return to `Idle`, recording the exchange if it completed and the
    /// transcript was not cleared meanwhile. Returns whether it was recorded.
    pub fn finish_turn(&mut self, ticket: TurnTicket, message: &str, reply: &AgentReply) -> bool {
        self.state = TurnState::Idle;
        self.touch();
        if ticket.epoch != self.epoch {
            tracing::debug!(session_id = %self.id, "Discarding reply for a cleared transcript");
            return false;
        }
        if !reply.outcome.is_complete() {
            return false;
        }
        self.transcript
            .push_exchange(Turn::user(message), Turn::assistant(reply.content.clone()));
        true
    }

    /// Return to `Idle` without recording anything.
    fn abandon_turn(&mut self) {
        self.state = TurnState::Idle;
    }

    /// Empty the transcript and invalidate any in-flight reply.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.epoch += 1;
    }

    pub fn update_filters(
        &mut self,
        update: FilterUpdate,
    ) -> Result<&FilterSelection, InvalidFilter> {
        self.filters = self.filters.apply(update)?;
        Ok(&self.filters)
    }

    pub fn reset_filters(&mut self) -> &FilterSelection {
        self.filters = FilterSelection::default();
        &self.filters
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            greeting: GREETING,
            state: self.state,
            transcript: self.transcript.turns().to_vec(),
            filters: self.filters.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

type SessionHandle = Arc<RwLock<ChatSession>>;

/// In-memory session registry (non-persistent).
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SessionSnapshot {
        let session = ChatSession::new();
        let snapshot = session.snapshot();
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::new(RwLock::new(session)));
        tracing::info!(session_id = %snapshot.id, "Created session");
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up a session and mark it active.
    async fn handle(&self, id: Uuid) -> Result<SessionHandle, SessionError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))?;
        handle.write().await.touch();
        Ok(handle)
    }

    /// Drop sessions that have been idle for longer than `max_idle`.
    /// Sessions awaiting a reply are kept. Returns the number removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let handles: Vec<(Uuid, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut stale = Vec::new();
        for (id, handle) in handles {
            if handle.read().await.is_stale(cutoff) {
                stale.push(id);
            }
        }
        if stale.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let evicted = stale.iter().filter(|id| sessions.remove(*id).is_some()).count();
        tracing::info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        evicted
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        Ok(self.handle(id).await?.read().await.snapshot())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| tracing::info!(session_id = %id, "Removed session"))
            .ok_or(SessionError::NotFound(id))
    }

    /// Send `content` to the agent and record the exchange.
    ///
    /// The agent runs on its own task so an abandoned request still returns
    /// the session to `Idle`.
    pub async fn submit(
        &self,
        id: Uuid,
        agent: Arc<Agent>,
        content: &str,
    ) -> Result<SubmitOutcome, SessionError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let handle = self.handle(id).await?;
        let ticket = handle.write().await.begin_turn()?;
        tracing::info!(
            session_id = %id,
            content_len = content.len(),
            history = ticket.history.len(),
            use_filters = ticket.filters.use_filters,
            "Received chat message"
        );

        let task_handle = Arc::clone(&handle);
        let task = tokio::spawn(async move {
            let reply = agent
                .respond(&ticket.history, &content, Some(&ticket.filters))
                .await;
            let mut session = task_handle.write().await;
            let recorded = session.finish_turn(ticket, &content, &reply);
            SubmitOutcome {
                reply,
                recorded,
                transcript_len: session.transcript().len(),
            }
        });

        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Reply task failed");
                handle.write().await.abandon_turn();
                Err(SessionError::Interrupted(e.to_string()))
            }
        }
    }

    pub async fn clear(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        session.clear();
        tracing::info!(session_id = %id, "Cleared conversation");
        Ok(session.snapshot())
    }

    pub async fn filters(&self, id: Uuid) -> Result<FilterSelection, SessionError> {
        Ok(self.handle(id).await?.read().await.filters().clone())
    }

    pub async fn update_filters(
        &self,
        id: Uuid,
        update: FilterUpdate,
    ) -> Result<FilterSelection, SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        let filters = session.update_filters(update)?.clone();
        tracing::debug!(session_id = %id, ?filters, "Updated filters");
        Ok(filters)
    }

    pub async fn reset_filters(&self, id: Uuid) -> Result<FilterSelection, SessionError> {
        let handle = self.handle(id).await?;
        let mut session = handle.write().await;
        Ok(session.reset_filters().clone())
    }
}

/// Periodically evict sessions idle for longer than `ttl`.
pub async fn session_cleanup_loop(sessions: SessionStore, ttl: Duration) {
    let check_interval = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));

    tracing::info!(
        "Session cleanup task started: check every {}s, idle timeout {}s",
        check_interval.as_secs(),
        ttl.as_secs()
    );

    loop {
        tokio::time::sleep(check_interval).await;
        sessions.evict_idle(ttl).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ReplyOutcome, UPSTREAM_APOLOGY};
    use crate::config::Config;
    use crate::llm::scripted::ScriptedLlm;
    use crate::store::fixtures::sample_store;
    use crate::tools::ToolRegistry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn agent(llm: ScriptedLlm) -> (TempDir, Arc<Agent>) {
        let (dir, store) = sample_store();
        let config = Config::new("test-key".to_string(), PathBuf::from("unused.db"));
        let agent = Agent::with_client(&config, Arc::new(llm), ToolRegistry::new(store));
        (dir, Arc::new(agent))
    }

    fn reply(outcome: ReplyOutcome) -> AgentReply {
        AgentReply {
            content: "reply".to_string(),
            outcome,
            iterations: 1,
            tool_calls: vec![],
        }
    }

    #[test]
    fn overlapping_turns_are_rejected() {
        let mut session = ChatSession::new();
        let ticket = session.begin_turn().unwrap();
        assert!(matches!(session.begin_turn(), Err(SessionError::Busy)));

        assert!(session.finish_turn(ticket, "hello", &reply(ReplyOutcome::Answered)));
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn reply_after_clear_is_discarded() {
        let mut session = ChatSession::new();
        let ticket = session.begin_turn().unwrap();
        session.clear();

        assert!(!session.finish_turn(ticket, "hello", &reply(ReplyOutcome::Answered)));
        assert!(session.transcript().is_empty());
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[test]
    fn clearing_does_not_touch_filters() {
        let mut session = ChatSession::new();
        session
            .update_filters(FilterUpdate {
                use_filters: Some(true),
                ..Default::default()
            })
            .unwrap();
        session.clear();
        assert!(session.filters().use_filters);
    }

    #[tokio::test]
    async fn answered_exchange_is_recorded() {
        let (_dir, agent) = agent(ScriptedLlm::new().then_answer("Salaam! How can I help?"));
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;

        let outcome = sessions.submit(id, agent, "  hello  ").await.unwrap();
        assert!(outcome.recorded);
        assert_eq!(outcome.transcript_len, 2);

        let snapshot = sessions.snapshot(id).await.unwrap();
        assert_eq!(snapshot.transcript[0].speaker, Speaker::User);
        assert_eq!(snapshot.transcript[0].content, "hello");
        assert_eq!(snapshot.transcript[1].content, "Salaam! How can I help?");
        assert_eq!(snapshot.state, TurnState::Idle);
    }

    #[tokio::test]
    async fn upstream_failure_keeps_prior_turns_intact() {
        let (_dir, agent) = agent(ScriptedLlm::new().then_answer("first answer").then_fail());
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;

        sessions.submit(id, Arc::clone(&agent), "first").await.unwrap();
        let before = sessions.snapshot(id).await.unwrap().transcript;

        let outcome = sessions.submit(id, agent, "second").await.unwrap();
        assert_eq!(outcome.reply.outcome, ReplyOutcome::UpstreamUnavailable);
        assert_eq!(outcome.reply.content, UPSTREAM_APOLOGY);
        assert!(!outcome.recorded);

        let after = sessions.snapshot(id).await.unwrap();
        assert_eq!(after.transcript, before);
        assert_eq!(after.state, TurnState::Idle);
    }

    #[tokio::test]
    async fn history_is_forwarded_on_the_next_turn() {
        let llm = Arc::new(ScriptedLlm::new().then_answer("one").then_answer("two"));
        let (_dir, store) = sample_store();
        let config = Config::new("test-key".to_string(), PathBuf::from("unused.db"));
        let agent = Arc::new(Agent::with_client(
            &config,
            llm.clone(),
            ToolRegistry::new(store),
        ));
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;

        sessions.submit(id, Arc::clone(&agent), "first").await.unwrap();
        sessions.submit(id, agent, "second").await.unwrap();

        let second_request = &llm.requests()[1];
        let contents: Vec<_> = second_request
            .iter()
            .skip(1)
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert_eq!(contents, vec!["first", "one", "second"]);
    }

    #[tokio::test]
    async fn empty_message_and_unknown_session_are_rejected() {
        let (_dir, agent) = agent(ScriptedLlm::new());
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;

        assert!(matches!(
            sessions.submit(id, Arc::clone(&agent), "   ").await,
            Err(SessionError::EmptyMessage)
        ));
        assert!(matches!(
            sessions.submit(Uuid::new_v4(), agent, "hi").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn clear_empties_transcript_and_leaves_store_alone() {
        let (dir, agent) = agent(ScriptedLlm::new().then_answer("answer"));
        let store = agent.tools().store().clone();
        let before = store.count().await.unwrap();
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;
        sessions.submit(id, agent, "hello").await.unwrap();

        let cleared = sessions.clear(id).await.unwrap();
        assert!(cleared.transcript.is_empty());
        let again = sessions.clear(id).await.unwrap();
        assert!(again.transcript.is_empty());
        assert_eq!(store.count().await.unwrap(), before);
        drop(dir);
    }

    #[tokio::test]
    async fn invalid_filter_update_keeps_previous_selection() {
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;
        let err = sessions
            .update_filters(
                id,
                FilterUpdate {
                    min_bedrooms: Some(-1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        assert_eq!(sessions.filters(id).await.unwrap(), FilterSelection::default());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let sessions = SessionStore::new();
        let a = sessions.create().await.id;
        let b = sessions.create().await.id;
        sessions
            .update_filters(
                a,
                FilterUpdate {
                    location: Some("Davis".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sessions.filters(b).await.unwrap().location, "Sacramento");

        sessions.remove(a).await.unwrap();
        assert_eq!(sessions.len().await, 1);
        assert!(matches!(
            sessions.snapshot(a).await,
            Err(SessionError::NotFound(_))
        ));
    }

    async fn age(sessions: &SessionStore, id: Uuid, by: chrono::Duration) {
        let handle = sessions.sessions.read().await.get(&id).cloned().unwrap();
        handle.write().await.last_activity = Utc::now() - by;
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let sessions = SessionStore::new();
        let stale = sessions.create().await.id;
        let fresh = sessions.create().await.id;
        age(&sessions, stale, chrono::Duration::hours(2)).await;

        let evicted = sessions.evict_idle(Duration::from_secs(1800)).await;
        assert_eq!(evicted, 1);
        assert_eq!(sessions.len().await, 1);
        assert!(matches!(
            sessions.snapshot(stale).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(sessions.snapshot(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn access_refreshes_activity() {
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;
        age(&sessions, id, chrono::Duration::hours(2)).await;

        sessions.filters(id).await.unwrap();
        assert_eq!(sessions.evict_idle(Duration::from_secs(1800)).await, 0);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn session_awaiting_reply_is_not_evicted() {
        let sessions = SessionStore::new();
        let id = sessions.create().await.id;
        let handle = sessions.sessions.read().await.get(&id).cloned().unwrap();
        handle.write().await.begin_turn().unwrap();
        age(&sessions, id, chrono::Duration::hours(2)).await;

        assert_eq!(sessions.evict_idle(Duration::from_secs(1800)).await, 0);
        assert_eq!(sessions.len().await, 1);
    }
}
