pub mod backend;
pub mod bug_detection;
pub mod code_generation;
pub mod file_data;

pub use backend::{BackendError, PromptBackend, PromptParameters, SharedBackend};
pub use bug_detection::{BugDetectionAgent, BUG_DETECTION_REQUEST};
pub use code_generation::{CodeGenerationAgent, CODE_GENERATION_REQUEST};
pub use file_data::{FileDataAgent, FILE_DATA_REQUEST};
