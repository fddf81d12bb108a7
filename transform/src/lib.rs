pub mod artifact;
pub mod cleaner;
pub mod transformer;

pub use artifact::ArtifactWriter;
pub use cleaner::{CleaningRule, PatternRule, StripCharRule, TextCleaner};
pub use transformer::{transform, SkipReason, TransformOutcome};
