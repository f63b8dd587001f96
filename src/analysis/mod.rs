pub mod builder;
pub mod normalizer;
pub mod orchestrator;
pub mod types;
pub mod validator;
