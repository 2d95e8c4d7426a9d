mod engine;
mod error;
mod markup;
mod template;

pub use engine::TemplateEngine;
pub use error::TplError;
pub use markup::{escape_html, text_to_html};
pub use template::ReloadSummary;
