//! Detection and resolution of applicants holding more than one accepted offer.

mod detector;
mod resolver;

pub use detector::{
    ConflictDetector, ConflictMembersError, ConflictRecord, ConflictReport, IntegrityWarning,
};
pub use resolver::{
    Clock, ConflictResolver, FailedTransition, ResolutionError, ResolutionOutcome,
    ResolutionResult, ResolveOptions, SystemClock, TransitionRecord,
};
