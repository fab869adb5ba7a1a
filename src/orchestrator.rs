//! Chat orchestration.
//!
//! Executes a [`Classification`]'s routing directive as a scatter/gather:
//! the semantic search, one request per structured endpoint, and any SRD
//! reference lookups are driven concurrently inside the request's own
//! future, each under its own timeout. Nothing is spawned, so when the
//! caller disconnects and the future is dropped, every in-flight call is
//! abandoned with it.
//!
//! # Failure policy
//!
//! | Situation | Result |
//! |-----------|--------|
//! | some backends fail | answer from the rest; failed ones contribute nothing |
//! | search and every structured endpoint fail, no SRD record | fixed "unable to retrieve" answer, LLM not called |
//! | backends answer but find nothing | fixed "no relevant data" answer, LLM not called |
//! | LLM fails | [`SynthesisError`], surfaced as a 5xx |

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classify::classify;
use crate::config::Config;
use crate::context::{
    assemble, entries_from_hits, entries_from_rows, entry_from_reference, AssembledContext,
    ContextEntry,
};
use crate::error::{BackendError, SynthesisError};
use crate::llm::OpenAiChat;
use crate::models::{
    ChatHints, ChatResponse, Classification, ReferenceKind, StructuredEndpoint,
};
use crate::rag::RagClient;
use crate::srd::SrdClient;
use crate::structured::{query_for, StructuredClient};
use crate::traits::{
    ReferenceLookup, SearchFilters, SemanticSearch, StructuredData, Synthesizer,
};

const SYSTEM_PROMPT: &str = "You are a rules and lore assistant for a Dungeons & Dragons 5th \
edition campaign. Answer the question using only the numbered context entries provided. \
Cite every fact with the tag of the entry it came from, for example [S1]. If the context \
does not contain the answer, say that you could not find it rather than guessing. Keep \
answers concise and use game terminology precisely.";

/// Answer returned when every selected backend failed or timed out.
pub const UNAVAILABLE_ANSWER: &str = "I was unable to retrieve any reference material for \
this question because the search services did not respond. Please try again shortly.";

/// Answer returned when the backends responded but nothing matched.
pub const NO_MATCH_ANSWER: &str = "I couldn't find anything in the rules reference or the \
adventure notes that matches this question. Try rephrasing it, or name a specific spell, \
monster, or room.";

/// The collaborators the orchestrator fans out to.
#[derive(Clone)]
pub struct Backends {
    pub search: Arc<dyn SemanticSearch>,
    pub structured: Arc<dyn StructuredData>,
    /// Optional SRD reference API.
    pub reference: Option<Arc<dyn ReferenceLookup>>,
    pub llm: Arc<dyn Synthesizer>,
}

impl Backends {
    /// HTTP clients for every backend named in the configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let reference: Option<Arc<dyn ReferenceLookup>> = if config.srd.enabled {
            Some(Arc::new(SrdClient::new(&config.srd)?))
        } else {
            None
        };
        Ok(Self {
            search: Arc::new(RagClient::new(&config.rag)?),
            structured: Arc::new(StructuredClient::new(&config.sqlite)?),
            reference,
            llm: Arc::new(OpenAiChat::new(&config.llm)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub top_k: usize,
    pub row_limit: usize,
    pub max_context_chars: usize,
    pub search_timeout: Duration,
    pub structured_timeout: Duration,
    pub reference_timeout: Duration,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.rag.top_k,
            row_limit: config.sqlite.limit,
            max_context_chars: config.context.max_chars,
            search_timeout: Duration::from_secs(config.rag.timeout_secs),
            structured_timeout: Duration::from_secs(config.sqlite.timeout_secs),
            reference_timeout: Duration::from_secs(config.srd.timeout_secs),
        }
    }
}

/// Settled result of one backend call.
#[derive(Debug)]
pub enum BackendOutcome<T> {
    Success(T),
    Failed(String),
    TimedOut,
}

impl<T> BackendOutcome<T> {
    /// Splits the outcome into its value, recording a failure under `label`.
    fn settle(self, label: &str, failures: &mut Vec<String>) -> Option<T> {
        match self {
            BackendOutcome::Success(value) => Some(value),
            BackendOutcome::Failed(reason) => {
                failures.push(format!("{}: {}", label, reason));
                None
            }
            BackendOutcome::TimedOut => {
                failures.push(format!("{}: timed out", label));
                None
            }
        }
    }
}

/// What the fan-out produced, before synthesis.
///
/// `attempted` and `succeeded` count only the adventure backends (semantic
/// search and structured endpoints). SRD lookups supplement the context but
/// never decide whether retrieval as a whole was available.
#[derive(Debug)]
pub struct Retrieval {
    pub context: AssembledContext,
    /// Number of search and structured calls issued.
    pub attempted: usize,
    /// Number of search and structured calls that returned a response.
    pub succeeded: usize,
    /// One `backend: reason` line per failed or timed-out call.
    pub failures: Vec<String>,
}

impl Retrieval {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

pub struct Orchestrator {
    backends: Backends,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(backends: Backends, settings: Settings) -> Self {
        Self { backends, settings }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            Backends::from_config(config)?,
            Settings::from_config(config),
        ))
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Classifies, retrieves, and synthesizes an answer for one message.
    pub async fn answer(
        &self,
        message: &str,
        hints: Option<&ChatHints>,
    ) -> Result<ChatResponse, SynthesisError> {
        let started = Instant::now();
        let message = message.trim();
        let classification = classify(message);

        tracing::info!(
            query = message,
            query_type = classification.query_type.as_str(),
            confidence = classification.confidence,
            reasoning = %classification.reasoning,
            "classified query"
        );

        let retrieval = self.retrieve(message, &classification, hints).await;

        tracing::info!(
            attempted = retrieval.attempted,
            succeeded = retrieval.succeeded,
            failures = ?retrieval.failures,
            sources = retrieval.context.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval settled"
        );

        if retrieval.context.is_empty() {
            let answer = if retrieval.all_failed() {
                tracing::warn!(
                    failures = ?retrieval.failures,
                    "every retrieval backend failed; returning degraded answer"
                );
                UNAVAILABLE_ANSWER
            } else {
                NO_MATCH_ANSWER
            };
            return Ok(ChatResponse {
                answer: answer.to_string(),
                sources: Vec::new(),
                query_type: classification.query_type,
                confidence: classification.confidence,
                grounded: false,
            });
        }

        let user = format!(
            "Context:\n{}\n\nQuestion: {}",
            retrieval.context.text, message
        );
        let answer = self.backends.llm.complete(SYSTEM_PROMPT, &user).await?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            model = self.backends.llm.model_name(),
            "answer synthesized"
        );

        Ok(ChatResponse {
            answer,
            sources: retrieval.context.sources,
            query_type: classification.query_type,
            confidence: classification.confidence,
            grounded: true,
        })
    }

    /// Runs the fan-out for a classified query and assembles the context.
    pub async fn retrieve(
        &self,
        message: &str,
        classification: &Classification,
        hints: Option<&ChatHints>,
    ) -> Retrieval {
        let plan = Plan::new(classification, hints);
        let settings = &self.settings;
        let entities = &classification.entities;

        let search = async {
            if !classification.routing.query_vector_backend {
                return None;
            }
            Some(
                guarded(
                    "rag",
                    settings.search_timeout,
                    self.backends
                        .search
                        .search(message, settings.top_k, &plan.filters),
                )
                .await,
            )
        };

        let structured = join_all(plan.endpoints.iter().map(|&endpoint| {
            let query = query_for(
                endpoint,
                entities,
                plan.region.as_deref(),
                settings.row_limit,
            );
            async move {
                guarded(
                    endpoint.path(),
                    settings.structured_timeout,
                    self.backends.structured.fetch(endpoint, &query),
                )
                .await
            }
        }));

        let references = join_all(plan.lookups.iter().filter_map(|(kind, name)| {
            let reference = self.backends.reference.as_ref()?;
            Some(async move {
                let outcome = guarded(
                    "srd",
                    settings.reference_timeout,
                    reference.lookup(*kind, name),
                )
                .await;
                (*kind, outcome)
            })
        }));

        let (search, structured, references) = tokio::join!(search, structured, references);

        let mut attempted = 0;
        let mut succeeded = 0;
        let mut failures = Vec::new();
        let mut entries: Vec<ContextEntry> = Vec::new();

        for (endpoint, outcome) in plan.endpoints.iter().zip(structured) {
            attempted += 1;
            if let Some(rows) = outcome.settle(endpoint.path(), &mut failures) {
                succeeded += 1;
                tracing::debug!(
                    endpoint = endpoint.path(),
                    rows = rows.len(),
                    "structured rows received"
                );
                entries.extend(entries_from_rows(&rows));
            }
        }

        for (kind, outcome) in references {
            if let Some(Some(record)) = outcome.settle("srd", &mut failures) {
                entries.push(entry_from_reference(kind, &record));
            }
        }

        if let Some(outcome) = search {
            attempted += 1;
            if let Some(hits) = outcome.settle("rag", &mut failures) {
                succeeded += 1;
                entries.extend(entries_from_hits(&hits));
            }
        }

        Retrieval {
            context: assemble(entries, settings.max_context_chars),
            attempted,
            succeeded,
            failures,
        }
    }
}

/// Routing after caller hints are applied.
struct Plan {
    endpoints: Vec<StructuredEndpoint>,
    region: Option<String>,
    filters: SearchFilters,
    lookups: Vec<(ReferenceKind, String)>,
}

impl Plan {
    /// Hints narrow the classifier's routing but never contradict it: a
    /// region hint is ignored when the query names its own region, and a
    /// category hint outside the routed endpoints is ignored.
    fn new(classification: &Classification, hints: Option<&ChatHints>) -> Self {
        let routing = &classification.routing;
        let entities = &classification.entities;

        let mut endpoints = if routing.query_structured_backend {
            routing.structured_endpoints.clone()
        } else {
            Vec::new()
        };

        let hint_region = hints
            .and_then(|h| h.region.as_deref())
            .map(|r| r.trim().to_uppercase())
            .filter(|r| matches!(r.as_str(), "A" | "B" | "C" | "D"));
        let hint_category = hints
            .and_then(|h| h.category.as_deref())
            .and_then(StructuredEndpoint::parse);

        let mut filters = SearchFilters::default();

        let region = match (&entities.region, hint_region) {
            (Some(own), Some(hint)) => {
                if *own == hint {
                    filters.region = Some(hint);
                }
                Some(own.clone())
            }
            (Some(own), None) => Some(own.clone()),
            (None, Some(hint)) => {
                filters.region = Some(hint.clone());
                Some(hint)
            }
            (None, None) => None,
        };

        if let Some(category) = hint_category {
            if endpoints.contains(&category) {
                endpoints = vec![category];
                filters.category = Some(category.path().to_string());
            }
        }

        let mut lookups = Vec::new();
        if let Some(name) = &entities.spell_name {
            lookups.push((ReferenceKind::Spell, name.clone()));
        }
        if let Some(name) = &entities.monster_name {
            lookups.push((ReferenceKind::Monster, name.clone()));
        }

        Self {
            endpoints,
            region,
            filters,
            lookups,
        }
    }
}

/// Runs one backend call under a timeout and folds every failure into the
/// returned outcome.
async fn guarded<T, F>(label: &str, timeout: Duration, call: F) -> BackendOutcome<T>
where
    F: Future<Output = Result<T, BackendError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => {
            tracing::debug!(
                backend = label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "backend call succeeded"
            );
            BackendOutcome::Success(value)
        }
        Ok(Err(e)) => {
            tracing::warn!(backend = label, error = %e, "backend call failed");
            BackendOutcome::Failed(e.to_string())
        }
        Err(_) => {
            tracing::warn!(
                backend = label,
                timeout_ms = timeout.as_millis() as u64,
                "backend call timed out"
            );
            BackendOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ReferenceRecord, Room, SearchHit, SourceOrigin, Spell, StructuredQuery, StructuredRows,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeSearch {
        hits: Option<Vec<SearchHit>>,
        delay: Duration,
        seen: Mutex<Vec<SearchFilters>>,
    }

    impl FakeSearch {
        fn ok(hits: Vec<SearchHit>) -> Self {
            Self {
                hits: Some(hits),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                hits: None,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SemanticSearch for FakeSearch {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            filters: &SearchFilters,
        ) -> Result<Vec<SearchHit>, BackendError> {
            self.seen.lock().unwrap().push(filters.clone());
            tokio::time::sleep(self.delay).await;
            self.hits.clone().ok_or(BackendError::Status {
                status: 503,
                body: "down".to_string(),
            })
        }

        async fn healthy(&self) -> bool {
            self.hits.is_some()
        }
    }

    /// Serves fixed rows; endpoints listed in `failing` return 500.
    struct FakeStructured {
        failing: Vec<StructuredEndpoint>,
        delay: Duration,
        calls: Mutex<Vec<(StructuredEndpoint, StructuredQuery)>>,
    }

    impl FakeStructured {
        fn new(failing: Vec<StructuredEndpoint>) -> Self {
            Self {
                failing,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StructuredData for FakeStructured {
        async fn fetch(
            &self,
            endpoint: StructuredEndpoint,
            query: &StructuredQuery,
        ) -> Result<StructuredRows, BackendError> {
            self.calls.lock().unwrap().push((endpoint, query.clone()));
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&endpoint) {
                return Err(BackendError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(match endpoint {
                StructuredEndpoint::Rooms => StructuredRows::Rooms(vec![Room {
                    room_id: query.room_id.clone().unwrap_or_else(|| "A1".to_string()),
                    name: Some("Guard Post".to_string()),
                    ..Default::default()
                }]),
                StructuredEndpoint::Spells => StructuredRows::Spells(vec![Spell {
                    name: "Fireball".to_string(),
                    level: Some(3),
                    ..Default::default()
                }]),
                StructuredEndpoint::Monsters => StructuredRows::Monsters(Vec::new()),
                StructuredEndpoint::Equipment => StructuredRows::Equipment(Vec::new()),
            })
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    struct FakeLlm {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FakeLlm {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Synthesizer for FakeLlm {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, SynthesisError> {
            self.calls.lock().unwrap().push(user.to_string());
            if self.fail {
                return Err(SynthesisError::Unreachable("connection refused".to_string()));
            }
            Ok("From the notes [S1].".to_string())
        }

        fn model_name(&self) -> &str {
            "fake"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    /// SRD fake that knows a single spell.
    struct FakeReference {
        known: Option<&'static str>,
    }

    #[async_trait]
    impl ReferenceLookup for FakeReference {
        async fn lookup(
            &self,
            kind: ReferenceKind,
            name: &str,
        ) -> Result<Option<ReferenceRecord>, BackendError> {
            if self.known != Some(name) {
                return Ok(None);
            }
            Ok(Some(ReferenceRecord {
                title: "Fireball".to_string(),
                text: "Level 3 evocation".to_string(),
                url: format!("https://srd.test/api/{}/fireball", kind.collection()),
            }))
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            text: format!("narrative {}", id),
            score: 0.5,
            metadata: serde_json::json!({}),
        }
    }

    fn settings() -> Settings {
        Settings {
            top_k: 5,
            row_limit: 10,
            max_context_chars: 10_000,
            search_timeout: Duration::from_millis(200),
            structured_timeout: Duration::from_millis(200),
            reference_timeout: Duration::from_millis(200),
        }
    }

    fn orchestrator(
        search: Arc<FakeSearch>,
        structured: Arc<FakeStructured>,
        llm: Arc<FakeLlm>,
    ) -> Orchestrator {
        Orchestrator::new(
            Backends {
                search,
                structured,
                reference: None,
                llm,
            },
            settings(),
        )
    }

    #[tokio::test]
    async fn room_query_hits_rooms_and_search() {
        let search = Arc::new(FakeSearch::ok(vec![hit("c1")]));
        let structured = Arc::new(FakeStructured::new(Vec::new()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search.clone(), structured.clone(), llm.clone());

        let resp = orch.answer("What is room A12?", None).await.unwrap();

        let calls = structured.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, StructuredEndpoint::Rooms);
        assert_eq!(calls[0].1.room_id.as_deref(), Some("A12"));
        assert_eq!(search.seen.lock().unwrap().len(), 1);

        assert!(resp.grounded);
        assert_eq!(resp.sources[0].origin, SourceOrigin::Sqlite);
        assert_eq!(resp.sources[0].reference, "rooms/A12");
        assert_eq!(resp.sources[1].reference, "chunk/c1");
        assert!(llm.calls.lock().unwrap()[0].contains("[S1] Room A12: Guard Post"));
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_fail_request() {
        let search = Arc::new(FakeSearch::failing());
        let structured = Arc::new(FakeStructured::new(vec![StructuredEndpoint::Monsters]));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm);

        // structured type, endpoints spells + monsters
        let resp = orch.answer("list all count of them", None).await.unwrap();
        assert!(resp.grounded);
        assert_eq!(resp.sources.len(), 1);
        assert_eq!(resp.sources[0].reference, "spells/fireball");
    }

    #[tokio::test]
    async fn all_backends_failing_skips_synthesis() {
        let search = Arc::new(FakeSearch::failing());
        let structured = Arc::new(FakeStructured::new(StructuredEndpoint::ALL.to_vec()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm.clone());

        let resp = orch.answer("How does concentration work?", None).await.unwrap();
        assert_eq!(resp.answer, UNAVAILABLE_ANSWER);
        assert!(resp.sources.is_empty());
        assert!(!resp.grounded);
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_results_report_no_match() {
        let search = Arc::new(FakeSearch::ok(Vec::new()));
        let structured = Arc::new(FakeStructured::new(vec![
            StructuredEndpoint::Spells,
            StructuredEndpoint::Rooms,
        ]));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm.clone());

        let resp = orch.answer("How does concentration work?", None).await.unwrap();
        assert_eq!(resp.answer, NO_MATCH_ANSWER);
        assert!(!resp.grounded);
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_backend_times_out_without_blocking_others() {
        let search = Arc::new(FakeSearch {
            hits: Some(vec![hit("slow")]),
            delay: Duration::from_secs(5),
            seen: Mutex::new(Vec::new()),
        });
        let structured = Arc::new(FakeStructured::new(Vec::new()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm);

        let started = Instant::now();
        let resp = orch.answer("What is room B2?", None).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(resp.sources.len(), 1);
        assert_eq!(resp.sources[0].reference, "rooms/B2");
    }

    #[tokio::test]
    async fn fan_out_runs_concurrently() {
        let search = Arc::new(FakeSearch {
            hits: Some(vec![hit("c1")]),
            delay: Duration::from_millis(150),
            seen: Mutex::new(Vec::new()),
        });
        let structured = Arc::new(FakeStructured {
            failing: Vec::new(),
            delay: Duration::from_millis(150),
            calls: Mutex::new(Vec::new()),
        });
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm);

        // semantic: rag + four structured endpoints, each 150ms
        let started = Instant::now();
        orch.answer("How does concentration work?", None).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn synthesis_failure_is_surfaced() {
        let search = Arc::new(FakeSearch::ok(vec![hit("c1")]));
        let structured = Arc::new(FakeStructured::new(Vec::new()));
        let llm = Arc::new(FakeLlm {
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let orch = orchestrator(search, structured, llm);

        let err = orch.answer("What is room A12?", None).await.unwrap_err();
        assert_eq!(err.code(), "llm_unreachable");
    }

    #[tokio::test]
    async fn category_hint_narrows_routed_endpoints() {
        let search = Arc::new(FakeSearch::ok(Vec::new()));
        let structured = Arc::new(FakeStructured::new(Vec::new()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search.clone(), structured.clone(), llm);

        let hints = ChatHints {
            region: Some("c".to_string()),
            category: Some("spells".to_string()),
        };
        orch.answer("How does concentration work?", Some(&hints))
            .await
            .unwrap();

        let calls = structured.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, StructuredEndpoint::Spells);
        let seen = search.seen.lock().unwrap();
        assert_eq!(seen[0].region.as_deref(), Some("C"));
        assert_eq!(seen[0].category.as_deref(), Some("spells"));
    }

    #[tokio::test]
    async fn hints_never_contradict_the_query() {
        let search = Arc::new(FakeSearch::ok(Vec::new()));
        let structured = Arc::new(FakeStructured::new(Vec::new()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search.clone(), structured.clone(), llm);

        let hints = ChatHints {
            region: Some("D".to_string()),
            category: Some("monsters".to_string()),
        };
        orch.answer("What is room A12?", Some(&hints)).await.unwrap();

        let calls = structured.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, StructuredEndpoint::Rooms);
        assert_eq!(calls[0].1.region.as_deref(), Some("A"));
        assert!(search.seen.lock().unwrap()[0].is_empty());
    }

    fn orchestrator_with_reference(
        search: Arc<FakeSearch>,
        structured: Arc<FakeStructured>,
        reference: FakeReference,
        llm: Arc<FakeLlm>,
    ) -> Orchestrator {
        Orchestrator::new(
            Backends {
                search,
                structured,
                reference: Some(Arc::new(reference)),
                llm,
            },
            settings(),
        )
    }

    #[tokio::test]
    async fn missing_reference_record_does_not_mask_outage() {
        let search = Arc::new(FakeSearch::failing());
        let structured = Arc::new(FakeStructured::new(StructuredEndpoint::ALL.to_vec()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator_with_reference(
            search,
            structured,
            FakeReference { known: None },
            llm.clone(),
        );

        let resp = orch.answer("Can a wizard cast fireball?", None).await.unwrap();
        assert_eq!(resp.answer, UNAVAILABLE_ANSWER);
        assert!(!resp.grounded);
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reference_record_grounds_answer_during_outage() {
        let search = Arc::new(FakeSearch::failing());
        let structured = Arc::new(FakeStructured::new(StructuredEndpoint::ALL.to_vec()));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator_with_reference(
            search,
            structured,
            FakeReference {
                known: Some("fireball"),
            },
            llm.clone(),
        );

        let resp = orch.answer("Can a wizard cast fireball?", None).await.unwrap();
        assert!(resp.grounded);
        assert_eq!(resp.sources.len(), 1);
        assert_eq!(resp.sources[0].origin, SourceOrigin::Srd);
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_recorded_per_backend() {
        let search = Arc::new(FakeSearch::failing());
        let structured = Arc::new(FakeStructured::new(vec![StructuredEndpoint::Rooms]));
        let llm = Arc::new(FakeLlm::new());
        let orch = orchestrator(search, structured, llm);

        let classification = classify("What is room A12?");
        let retrieval = orch
            .retrieve("What is room A12?", &classification, None)
            .await;
        assert_eq!(retrieval.attempted, 2);
        assert_eq!(retrieval.succeeded, 0);
        assert!(retrieval.all_failed());
        assert_eq!(retrieval.failures.len(), 2);
        assert!(retrieval.failures[0].starts_with("rooms: "));
        assert!(retrieval.failures[1].starts_with("rag: "));
    }
}
