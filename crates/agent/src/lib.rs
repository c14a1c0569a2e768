//! Chat runtime - language model calls and turn orchestration
//!
//! This crate drives one chat turn end to end:
//! - Extracts preference updates from the conversation (`extractor`)
//! - Applies the onboarding decision table from `geochat-core`
//! - Streams open-domain answers back while storing them (`completion`)
//!
//! # Key Types
//!
//! - `ChatRuntime` - Turn pipeline (see `runtime` module)
//! - `LlmClient` - Pluggable model client; `OpenAiClient` for OpenAI-compatible
//!   servers, `ScriptedLlmClient` for tests
//!
//! The model never writes preferences directly. Extracted values pass the
//! same validation as the preferences form before anything is stored.

pub mod completion;
pub mod extractor;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod prompts;
pub mod runtime;

pub use completion::{Relay, RelayOutcome};
pub use llm::{ChatRequest, LlmClient, LlmError, StructuredRequest, TextStream};
pub use mock::{ScriptedLlmClient, StreamScript};
pub use openai::OpenAiClient;
pub use runtime::{ChatRuntime, PreferencesView, RuntimeError, RuntimeSettings, TurnReply};
