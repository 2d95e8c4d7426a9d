use thiserror::Error;

#[derive(Debug, Error)]
pub enum TplError {
    #[error("unknown workflow template: {0}")]
    UnknownWorkflow(String),

    #[error("template file invalid: {0}")]
    InvalidTemplateFile(String),

    #[error("render error: {0}")]
    Render(#[from] minijinja::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
