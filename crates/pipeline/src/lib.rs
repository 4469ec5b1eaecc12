//! VAD/turn segmentation, the pluggable collaborator chains, the playback
//! pacer, and the turn-pipeline worker that strings them together (§4.3-§4.5).

pub mod collaborators;
pub mod error;
pub mod pacer;
pub mod turn_pipeline;
pub mod vad;

pub use collaborators::chains::{SttChain, TtsChain};
pub use collaborators::probe::{verify_tools, ToolProbeResult};
pub use collaborators::{AudioDecoder, LlmBackend, SttBackend, SynthesizedAudio, TtsBackend};
pub use error::PipelineError;
pub use pacer::PlaybackPacer;
pub use turn_pipeline::{QueuedTurn, TurnEventSink, TurnQueue, TurnWorkerContext};
pub use vad::{FinalizedTurn, TurnSegmenter, VadConfig};
