pub mod assessment;

// Re-export commonly used types for convenience
pub use assessment::{
    AssessmentCategory, AssessmentError, AssessmentResult, ChunkedAssessor, IseClient, IseConfig,
    Language, PronunciationAssessmentResult, PronunciationAssessor,
};
