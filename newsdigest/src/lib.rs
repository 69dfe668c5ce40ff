// Library interface for newsdigest modules
// This allows tests and the binary to import modules

pub mod capping;
pub mod date_filter;
pub mod dedup;
pub mod delivery;
pub mod discovery;
pub mod ingestion;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod render;
