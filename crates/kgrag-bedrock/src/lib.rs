mod converse;
mod credentials;
mod embedding;
mod runtime;

pub use aws_credential_types::Credentials;
pub use converse::{BedrockConverse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use credentials::CredentialSource;
pub use embedding::{BedrockEmbedding, EmbeddingProvider};
pub use runtime::BedrockRuntime;
