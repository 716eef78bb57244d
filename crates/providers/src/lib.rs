pub mod openai_compat;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{GenerateRequest, GenerateResponse, TextGenerator, Usage};
