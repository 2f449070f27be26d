//! Streaming side of an AI turn: the response buffer parser, the sink the
//! chat consumer implements, and the async loop that ties them together.

mod parser;
mod sanitize;
mod sink;
mod turn;

pub use parser::{FileBlock, LiveBlock, StreamView, StreamingPatchParser, final_operations, scan};
pub use sanitize::strip_trailing_commas;
pub use sink::{CollectingSink, StreamEvent, StreamSink};
pub use turn::{CANCELLED_MESSAGE, CancelFlag, TurnOutcome, run_turn};
