//! voxpipe - voice interaction assistant
//!
//! One linear pipeline per interaction:
//!
//! ```text
//! microphone ──► speech-to-text ──► LLM ──► text-to-speech ──► speakers
//!   (cpal)        (cloud STT)     (Gemini)    (cloud TTS)      (cpal)
//! ```
//!
//! A failed transcription ends the interaction with a user-visible notice;
//! generation and synthesis failures are classified provider errors. Three
//! entry points wrap the pipeline: a web UI server, a one-shot console
//! interaction, and a model-catalog diagnostic.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Outcome, Pipeline};
