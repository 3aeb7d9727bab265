//! Background worker that backfills session metadata.
//!
//! On start it closes sessions orphaned by a previous process, then scans
//! for closed sessions without metadata, asks a background model for a
//! structured summary of each, and repeats every `interval`. Per-session
//! failures are logged and the session stays eligible for the next scan.

pub mod prompt;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use recall_core::llm::{ChatMessage, CompletionRequest, LlmError, ModelRouter, RouteHints};
use recall_core::settings::SummarizerSettings;
use recall_core::{Clock, SystemClock};
use recall_store::{Session, SessionMetadata, StoreError, SummaryStore};

use crate::error::SummarizerError;
use self::prompt::{condense_transcript, parse_response, user_prompt, SYSTEM_PROMPT};

const MAX_RESPONSE_TOKENS: u32 = 1024;

#[derive(Clone, Debug)]
pub struct SummarizerConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub pause_between: Duration,
    pub call_timeout: Duration,
    pub model_preference: Option<String>,
    pub max_transcript_bytes: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self::from(&SummarizerSettings::default())
    }
}

impl From<&SummarizerSettings> for SummarizerConfig {
    fn from(s: &SummarizerSettings) -> Self {
        Self {
            interval: Duration::from_secs(s.interval_secs),
            batch_size: s.batch_size as usize,
            pause_between: Duration::from_secs(s.pause_between_secs),
            call_timeout: Duration::from_secs(s.call_timeout_secs),
            model_preference: s.model_preference.clone(),
            max_transcript_bytes: s.max_transcript_bytes,
        }
    }
}

pub struct Summarizer {
    store: Arc<dyn SummaryStore>,
    router: Arc<dyn ModelRouter>,
    config: SummarizerConfig,
    /// Sessions still open that started before this are orphans.
    start_time: DateTime<Utc>,
}

impl Summarizer {
    pub fn new(
        store: Arc<dyn SummaryStore>,
        router: Arc<dyn ModelRouter>,
        config: SummarizerConfig,
    ) -> Self {
        Self::with_clock(store, router, config, &SystemClock)
    }

    pub fn with_clock(
        store: Arc<dyn SummaryStore>,
        router: Arc<dyn ModelRouter>,
        config: SummarizerConfig,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            store,
            router,
            config,
            start_time: clock.now(),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Close sessions left open by a process that died before ending them.
    pub fn recover_orphans(&self) -> Result<usize, StoreError> {
        self.store.close_orphaned_sessions(self.start_time)
    }

    /// One scan: summarize up to `batch_size` sessions. Returns how many
    /// succeeded. Cancellation stops between sessions.
    #[instrument(skip_all)]
    pub async fn run_once(&self, cancel: &CancellationToken) -> usize {
        let sessions = match self.store.unsummarized_sessions(self.config.batch_size) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "failed to list unsummarized sessions");
                return 0;
            }
        };
        if sessions.is_empty() {
            return 0;
        }
        debug!(pending = sessions.len(), "summarizing sessions");

        let mut done = 0;
        for (i, session) in sessions.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    () = tokio::time::sleep(self.config.pause_between) => {}
                    () = cancel.cancelled() => break,
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            match self.summarize_session(session, cancel).await {
                Ok(_) => done += 1,
                Err(e) => warn!(
                    session_id = %session.id,
                    error = %e,
                    "summarization failed, session stays eligible"
                ),
            }
        }
        done
    }

    /// Summarize one session and store the result.
    #[instrument(skip(self, session, cancel), fields(session_id = %session.id))]
    pub async fn summarize_session(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<SessionMetadata, SummarizerError> {
        let transcript = self.store.session_transcript(&session.id)?;
        let condensed = condense_transcript(&transcript, self.config.max_transcript_bytes);
        if condensed.is_empty() {
            return Err(SummarizerError::EmptyTranscript(session.id.to_string()));
        }

        let provider = self
            .router
            .select(&RouteHints::background(self.config.model_preference.clone()))?;
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(user_prompt(&condensed)),
            ],
            max_tokens: Some(MAX_RESPONSE_TOKENS),
            temperature: Some(0.2),
        };

        let raw = tokio::select! {
            result = tokio::time::timeout(self.config.call_timeout, provider.complete(&request)) => {
                match result {
                    Ok(response) => response?,
                    Err(_) => return Err(LlmError::Timeout(self.config.call_timeout).into()),
                }
            }
            () = cancel.cancelled() => return Err(LlmError::Cancelled.into()),
        };
        if raw.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty response".into()).into());
        }
        let parsed = parse_response(&raw);

        let mut tools_used: BTreeMap<String, u32> = BTreeMap::new();
        for call in self.store.session_tool_calls(&session.id)? {
            *tools_used.entry(call.tool_name).or_default() += 1;
        }

        let metadata = SessionMetadata {
            one_liner: parsed.one_liner,
            paragraph: parsed.paragraph,
            detailed: parsed.detailed,
            key_decisions: parsed.key_decisions,
            participants: parsed.participants,
            session_type: parsed.session_type,
            tools_used,
        };
        self.store
            .set_session_metadata(&session.id, &metadata, &parsed.title, &parsed.tags)?;
        info!(model = provider.model(), title = %parsed.title, "session summarized");
        Ok(metadata)
    }

    /// Spawn the worker loop.
    pub fn start(self) -> SummarizerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        SummarizerHandle { cancel, join }
    }

    /// Orphan recovery, a catch-up scan, then a scan every `interval` until
    /// cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        match self.recover_orphans() {
            Ok(0) => {}
            Ok(closed) => info!(closed, "recovered orphaned sessions"),
            Err(e) => warn!(error = %e, "orphan recovery failed"),
        }
        info!(interval_secs = self.config.interval.as_secs(), "summarizer started");

        loop {
            let done = self.run_once(&cancel).await;
            if done > 0 {
                info!(done, "summarizer scan complete");
            }
            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {}
                () = cancel.cancelled() => break,
            }
        }
        info!("summarizer stopped");
    }
}

/// Handle to a running worker.
pub struct SummarizerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SummarizerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for the worker to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "summarizer task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use recall_core::ids::{ConversationId, SessionId, ToolCallId};
    use recall_core::llm::mock::{MockResponse, ScriptedProvider, StaticRouter};
    use recall_core::FixedClock;
    use recall_store::{
        ArchiveReader, ArchiveStore, ArchivedMessage, ArchivedToolCall, Database, EndReason, Role,
    };

    const GOOD_JSON: &str = r#"{"title":"Boiler check","tags":["home"],"one_liner":"Checked the boiler.",
        "paragraph":"Looked at boiler pressure.","detailed":"","key_decisions":["top up pressure"],
        "participants":["user"],"session_type":"operations"}"#;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap()
    }

    fn conv() -> ConversationId {
        ConversationId::from_raw("home")
    }

    fn store_at(now: DateTime<Utc>) -> (ArchiveStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now));
        let store = ArchiveStore::with_clock(Database::in_memory().unwrap(), clock.clone());
        (store, clock)
    }

    fn session_with_messages(store: &ArchiveStore, start: DateTime<Utc>) -> SessionId {
        let s = store.start_session_at(&conv(), start).unwrap();
        store
            .archive_messages(&[
                ArchivedMessage::new(&s.id, &conv(), Role::System, "preamble", start),
                ArchivedMessage::new(&s.id, &conv(), Role::User, "is the boiler ok?", start),
                ArchivedMessage::new(&s.id, &conv(), Role::Assistant, "pressure is low", start),
            ])
            .unwrap();
        s.id
    }

    fn closed_session(store: &ArchiveStore, start: DateTime<Utc>) -> SessionId {
        let id = session_with_messages(store, start);
        store
            .end_session_at(&id, EndReason::Normal, start + chrono::Duration::minutes(5))
            .unwrap();
        id
    }

    fn fast_config() -> SummarizerConfig {
        SummarizerConfig {
            interval: Duration::from_secs(300),
            pause_between: Duration::from_secs(5),
            call_timeout: Duration::from_secs(60),
            ..SummarizerConfig::default()
        }
    }

    fn summarizer(
        store: &ArchiveStore,
        clock: &FixedClock,
        responses: Vec<MockResponse>,
    ) -> (Summarizer, Arc<ScriptedProvider>, Arc<StaticRouter>) {
        let provider = Arc::new(ScriptedProvider::new(responses));
        let router = Arc::new(StaticRouter::new(provider.clone()));
        let worker =
            Summarizer::with_clock(Arc::new(store.clone()), router.clone(), fast_config(), clock);
        (worker, provider, router)
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_recovery_then_backfill() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        let orphan = session_with_messages(&store, t0());
        let (worker, provider, router) =
            summarizer(&store, &clock, vec![MockResponse::text(GOOD_JSON)]);

        let handle = worker.start();
        for _ in 0..50 {
            if store.get_session(&orphan).unwrap().metadata.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        handle.stop().await;

        let session = store.get_session(&orphan).unwrap();
        assert_eq!(session.end_reason, Some(EndReason::CrashRecovery));
        assert_eq!(session.title, "Boiler check");
        assert_eq!(session.tags, vec!["home"]);
        let meta = session.metadata.unwrap();
        assert_eq!(meta.one_liner, "Checked the boiler.");
        assert_eq!(meta.session_type, "operations");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(router.seen_hints(), vec![RouteHints::background(None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_started_after_process_start_are_not_orphans() {
        let (store, clock) = store_at(t0());
        let (worker, _, _) = summarizer(&store, &clock, vec![]);
        let live = session_with_messages(&store, t0() + chrono::Duration::minutes(1));

        assert_eq!(worker.recover_orphans().unwrap(), 0);
        assert!(!store.get_session(&live).unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_response_becomes_paragraph() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        let older = closed_session(&store, t0());
        let newer = closed_session(&store, t0() + chrono::Duration::minutes(20));
        // Newest first: `newer` gets the plain-text response.
        let (worker, provider, _) = summarizer(
            &store,
            &clock,
            vec![MockResponse::text("They discussed the boiler."), MockResponse::text(GOOD_JSON)],
        );

        let done = worker.run_once(&CancellationToken::new()).await;
        assert_eq!(done, 2);
        assert_eq!(provider.call_count(), 2);

        let fallback = store.get_session(&newer).unwrap();
        assert_eq!(fallback.title, "");
        assert_eq!(fallback.metadata.unwrap().paragraph, "They discussed the boiler.");
        assert_eq!(store.get_session(&older).unwrap().title, "Boiler check");
        assert!(store.unsummarized_sessions(10).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transcript_prompt_skips_system_messages() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        closed_session(&store, t0());
        let (worker, provider, _) = summarizer(&store, &clock, vec![MockResponse::text(GOOD_JSON)]);

        worker.run_once(&CancellationToken::new()).await;
        let request = &provider.requests()[0];
        assert_eq!(request.messages.len(), 2);
        let user = &request.messages[1].content;
        assert!(user.contains("[09:00] user: is the boiler ok?"), "{user}");
        assert!(!user.contains("preamble"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_session_eligible() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        let id = closed_session(&store, t0());
        let (worker, _, _) = summarizer(
            &store,
            &clock,
            vec![MockResponse::delayed(Duration::from_secs(120), MockResponse::text(GOOD_JSON))],
        );

        assert_eq!(worker.run_once(&CancellationToken::new()).await, 0);
        let pending = store.unsummarized_sessions(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn router_failure_leaves_session_eligible() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        closed_session(&store, t0());
        let worker = Summarizer::with_clock(
            Arc::new(store.clone()),
            Arc::new(StaticRouter::empty()),
            fast_config(),
            clock.as_ref(),
        );
        assert_eq!(worker.run_once(&CancellationToken::new()).await, 0);
        assert_eq!(store.unsummarized_sessions(10).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_usage_is_tallied() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        let id = closed_session(&store, t0());
        let calls: Vec<_> = ["search_history", "save_temp", "search_history"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                ArchivedToolCall::started(ToolCallId::from_raw(format!("call-{i}")), &id, &conv(), *name, "{}", t0())
                    .complete("ok", t0())
            })
            .collect();
        store.archive_tool_calls(&calls).unwrap();
        let (worker, _, _) = summarizer(&store, &clock, vec![MockResponse::text(GOOD_JSON)]);

        worker.run_once(&CancellationToken::new()).await;
        let meta = store.get_session(&id).unwrap().metadata.unwrap();
        assert_eq!(meta.tools_used.get("search_history"), Some(&2));
        assert_eq!(meta.tools_used.get("save_temp"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scan_stops_between_sessions() {
        let (store, clock) = store_at(t0() + chrono::Duration::hours(1));
        closed_session(&store, t0());
        closed_session(&store, t0() + chrono::Duration::minutes(20));
        let (worker, provider, _) = summarizer(
            &store,
            &clock,
            vec![MockResponse::text(GOOD_JSON), MockResponse::text(GOOD_JSON)],
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scan = tokio::spawn(async move { worker.run_once(&token).await });
        // Let the first session finish, then cancel during the pause.
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        assert_eq!(scan.await.unwrap(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_promptly_when_idle() {
        let (store, clock) = store_at(t0());
        let (worker, _, _) = summarizer(&store, &clock, vec![]);
        let handle = worker.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;
    }

    struct UnreachableArchive;

    impl ArchiveReader for UnreachableArchive {
        fn list_sessions(
            &self,
            _conversation_id: Option<&ConversationId>,
            _limit: usize,
        ) -> Result<Vec<Session>, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
        fn session_transcript(&self, _id: &SessionId) -> Result<Vec<ArchivedMessage>, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
        fn session_tool_calls(&self, _id: &SessionId) -> Result<Vec<ArchivedToolCall>, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
        fn latest_carry_forward(
            &self,
            _conversation_id: &ConversationId,
        ) -> Result<Option<(SessionId, String)>, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
    }

    impl SummaryStore for UnreachableArchive {
        fn unsummarized_sessions(&self, _limit: usize) -> Result<Vec<Session>, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
        fn close_orphaned_sessions(&self, _cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
        fn set_session_metadata(
            &self,
            _id: &SessionId,
            _metadata: &SessionMetadata,
            _title: &str,
            _tags: &[String],
        ) -> Result<(), StoreError> {
            Err(StoreError::Database("database is locked".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_archive_skips_the_scan() {
        let provider = Arc::new(ScriptedProvider::new(vec![MockResponse::text(GOOD_JSON)]));
        let worker = Summarizer::with_clock(
            Arc::new(UnreachableArchive),
            Arc::new(StaticRouter::new(provider.clone())),
            fast_config(),
            &FixedClock::new(t0()),
        );
        assert!(worker.recover_orphans().is_err());
        assert_eq!(worker.run_once(&CancellationToken::new()).await, 0);
        assert_eq!(provider.call_count(), 0);
    }
}
