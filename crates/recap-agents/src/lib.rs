pub mod appender;
pub mod cleanup;
pub mod description;
pub mod fallback;
pub mod history;
pub mod local_fallback;
pub mod openai;
pub mod prompt;
pub mod providers;
pub mod relay;
pub mod runtime;

pub use appender::SummaryAppender;
pub use cleanup::strip_think_tags;
pub use description::build_status_description;
pub use fallback::{AttemptOutcome, FallbackOrchestrator, GenerationAttempt, GenerationOutcome};
pub use history::{ConversationHistory, HistoryEntry};
pub use local_fallback::{LOCAL_FALLBACK_MODEL, LocalFallbackSummarizer};
pub use openai::OpenAiCompatProvider;
pub use prompt::{PromptComposer, PromptTemplate};
pub use providers::{ChatMessage, ChatRole, LlmProvider, LlmRequest, TextStream};
pub use relay::{RELAY_BUFFER, RelaySink, StreamEvent};
pub use runtime::SummaryRuntime;
