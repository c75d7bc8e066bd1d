use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankerError>;

#[derive(Error, Debug)]
pub enum RankerError {
    #[error("Taxonomy YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid taxonomy: {0}")]
    InvalidTaxonomy(String),
}
