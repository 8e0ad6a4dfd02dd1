//! Audio capture and playback
//!
//! The microphone and the output device are each acquired, used, and
//! released within a single pipeline stage, never held across stages.

mod capture;
mod playback;

pub use capture::{AudioSample, Microphone, SAMPLE_RATE, UtteranceDetector, record_utterance};
pub use playback::{AudioPlayer, BlockingPlayer, CpalMixer, DetachedPlayer, Mixer, decode_mp3};
