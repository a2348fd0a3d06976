pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod resolve;
pub mod table;
