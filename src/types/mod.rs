// Public modules
pub mod content;
pub mod generate_content;
pub mod model;

// Re-exports
pub use content::{Content, Part, Role};
pub use generate_content::{
    Candidate, GenerateContentParams, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, PromptFeedback, UsageMetadata,
};
pub use model::{KnownModel, Model};
