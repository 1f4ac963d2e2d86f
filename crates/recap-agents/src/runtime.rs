use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use recap_common::{ChatRole, Error, HistoryEntry, Result, StatusRecord};
use recap_config::AppConfig;
use recap_db::SummaryStore;
use tracing::{debug, info, instrument, warn};

use crate::appender::SummaryAppender;
use crate::cleanup::strip_think_tags;
use crate::description::build_status_description;
use crate::fallback::{FallbackOrchestrator, GenerationOutcome};
use crate::history::{ConversationHistory, DEFAULT_HISTORY_CAPACITY};
use crate::openai::OpenAiCompatProvider;
use crate::prompt::PromptComposer;
use crate::providers::LlmProvider;
use crate::relay::RelaySink;

/// Everything the pipeline reads before calling upstream.
struct PreparedGeneration {
    records: Vec<StatusRecord>,
    user_message: String,
    prompt: String,
}

/// The summary generation pipeline: read records, build the prompt, stream a
/// completion through the fallback chain, persist, and report.
pub struct SummaryRuntime {
    store: Arc<dyn SummaryStore>,
    composer: PromptComposer,
    orchestrator: FallbackOrchestrator,
    appender: SummaryAppender,
    history: Mutex<ConversationHistory>,
    strip_think_tags: bool,
}

impl SummaryRuntime {
    pub fn new(
        store: Arc<dyn SummaryStore>,
        composer: PromptComposer,
        orchestrator: FallbackOrchestrator,
    ) -> Self {
        let history = restore_history(store.as_ref(), DEFAULT_HISTORY_CAPACITY);
        Self {
            appender: SummaryAppender::new(Arc::clone(&store)),
            store,
            composer,
            orchestrator,
            history: Mutex::new(history),
            strip_think_tags: false,
        }
    }

    /// Wire up the pipeline from loaded configuration. Prompt templates are
    /// validated here, so a bad template fails startup rather than requests.
    pub fn from_config(config: &AppConfig, store: Arc<dyn SummaryStore>) -> Result<Self> {
        let composer = PromptComposer::load(config.prompts.dir.as_deref())?;

        let provider: Option<Arc<dyn LlmProvider>> = match config.llm.api_key() {
            Some(key) => {
                info!(
                    base_url = %config.llm.base_url,
                    models = ?config.llm.models,
                    "upstream provider configured"
                );
                Some(Arc::new(OpenAiCompatProvider::new(key, config.llm.base_url.clone())))
            }
            None => {
                warn!("no API key configured; summaries will be generated locally");
                None
            }
        };

        let orchestrator = FallbackOrchestrator::from_config(provider, &config.llm);
        Ok(Self::new(store, composer, orchestrator)
            .with_strip_think_tags(config.summary.strip_think_tags)
            .with_history_capacity(config.summary.history_capacity))
    }

    pub fn with_strip_think_tags(mut self, enabled: bool) -> Self {
        self.strip_think_tags = enabled;
        self
    }

    /// Resize the history, reloading the newest `capacity` saved entries.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = Mutex::new(restore_history(self.store.as_ref(), capacity));
        self
    }

    pub fn store(&self) -> &Arc<dyn SummaryStore> {
        &self.store
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    /// Whether the upstream provider answers; `false` when none is configured.
    pub async fn upstream_healthy(&self) -> bool {
        let Some(provider) = self.orchestrator.provider() else {
            return false;
        };
        match provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("upstream health check failed: {e}");
                false
            }
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn clear_history(&self) -> Result<()> {
        self.store.clear_history()?;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("conversation history cleared");
        Ok(())
    }

    /// Run one generation, streaming events into `sink`.
    ///
    /// The sink always receives exactly one terminal event unless the caller
    /// disconnects, in which case nothing is persisted and
    /// [`Error::Cancelled`] is returned.
    #[instrument(skip_all)]
    pub async fn generate(&self, sink: RelaySink) -> Result<GenerationOutcome> {
        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("cannot prepare generation: {err}");
                let _ = sink.fail(err.to_string()).await;
                return Err(err);
            }
        };
        debug!(records = prepared.records.len(), "prompt composed");

        let mut outcome = match self
            .orchestrator
            .run(&prepared.prompt, &prepared.records, &sink)
            .await
        {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                let _ = sink.fail(err.to_string()).await;
                return Err(err);
            }
        };

        if self.strip_think_tags {
            outcome.text = strip_think_tags(&outcome.text);
        }

        if sink.is_closed() {
            info!("caller disconnected before commit; nothing persisted");
            return Err(Error::Cancelled);
        }

        let consumed: Vec<String> = prepared.records.iter().map(|r| r.id.clone()).collect();
        if let Err(err) = self.appender.commit(&outcome.text, &consumed, Local::now()) {
            let _ = sink.fail(err.to_string()).await;
            return Err(err);
        }

        self.remember(prepared.user_message, outcome.text.clone());
        info!(
            model = %outcome.model,
            local = outcome.used_local_fallback(),
            records = consumed.len(),
            "summary generated"
        );

        if sink.finish(outcome.text.clone()).await.is_err() {
            debug!("caller left before the done event");
        }
        Ok(outcome)
    }

    /// The exact prompt a generation started now would send upstream.
    pub fn preview_prompt(&self) -> Result<String> {
        Ok(self.prepare()?.prompt)
    }

    fn prepare(&self) -> Result<PreparedGeneration> {
        let records = self.store.list_records()?;
        let summary = self.store.get_summary()?;
        let description = build_status_description(&records);
        let user_message = self
            .composer
            .render_user_message(&description, &summary, Local::now());
        let prompt = self.composer.compose(&user_message);
        Ok(PreparedGeneration {
            records,
            user_message,
            prompt,
        })
    }

    /// History is best effort: a failed save is logged and the in-memory
    /// copy still advances.
    fn remember(&self, user_message: String, reply: String) {
        let turns = [
            HistoryEntry::new(ChatRole::User, user_message),
            HistoryEntry::new(ChatRole::Assistant, reply),
        ];
        let capacity = {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            for turn in &turns {
                history.push_entry(turn.clone());
            }
            history.capacity()
        };
        if let Err(e) = self.store.append_history(&turns, capacity) {
            warn!("failed to save conversation history: {e}");
        }
    }
}

fn restore_history(store: &dyn SummaryStore, capacity: usize) -> ConversationHistory {
    let capacity = capacity.max(1);
    match store.load_history(capacity) {
        Ok(saved) => {
            if !saved.is_empty() {
                debug!(entries = saved.len(), "restored conversation history");
            }
            ConversationHistory::restore(capacity, saved)
        }
        Err(e) => {
            warn!("failed to load conversation history: {e}");
            ConversationHistory::new(capacity)
        }
    }
}
