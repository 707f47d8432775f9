//! HTTP transport for the survey.
//!
//! The client owns all state: every request carries the theme and
//! conversation state from the previous response, and every response returns
//! the updated pair.

pub mod routes;

pub use routes::{ConvoRequest, ConvoResponse, SurveyRouteState, cors_layer, survey_routes};
