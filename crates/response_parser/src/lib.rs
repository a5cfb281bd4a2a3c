pub mod parsed;
pub mod parser;
pub mod schema;
pub mod validator;

pub use parsed::{ParsedResponse, ResponseFormat};
pub use parser::{extract_fenced_block, parse};
pub use schema::ResponseSchema;
pub use validator::{validate, ValidationError};
