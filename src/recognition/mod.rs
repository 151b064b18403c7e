//! Recognition polling: frame capture and encoding, the poll state machine,
//! and what a result batch means for the attendance log.

mod capture;
mod poller;
mod results;

pub use capture::{encode_frame, target_size, EncodedFrame};
pub use poller::{
    PollAction, PollOutcome, PollerState, PollerStats, RecognitionContext, RecognitionPoller,
    ResultSink, SkipReason,
};
pub use results::{apply_results, BatchSummary, MarkedSet};
