//! A stateless, multi-theme conversational survey service.

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod survey;
