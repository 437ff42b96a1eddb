pub mod index;
pub mod manager;
pub mod runtime;
pub mod safety;

pub use index::{CompiledEntry, CompiledIndex, IndexTemplate, DEFAULT_MEMO_CAPACITY};
pub use manager::{IndexError, IndexManager};
pub use runtime::{KeyText, MatchOutcome, MatcherError, MatcherRuntime};
pub use safety::{SafetyAnalyzer, SafetyLevel, SafetyReport};
