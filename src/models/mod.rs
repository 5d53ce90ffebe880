mod refinement;
mod session;

pub use refinement::{PromptRefinement, Verdict};
pub use session::{
    Attempt, ContinuationEntry, ErrorType, Execution, Session, SessionFiles, StageTimings,
    language_extension,
};
