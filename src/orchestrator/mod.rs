mod session_loop;
mod state;

pub use session_loop::SessionLoop;
pub use state::{LogSink, LoopEvent, LoopStage, OrchestrateError, OrchestrateOptions};
