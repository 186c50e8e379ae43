//! Constructors for every conversation node.
//!
//! Nodes are data (see [`crate::flow::node::NodeConfig`]); these functions
//! build them with the prompts and tool schemas of each dialog step.

pub mod booking;
pub mod completion;
pub mod greeting;
pub mod patient_details;
pub mod patient_info;
pub mod patient_summary;
pub mod pricing;
pub mod router;
pub mod second_service;
pub mod service_selection;
pub mod transfer;

/// Shared language directive appended to every role prompt.
pub(crate) const LANGUAGE_CONFIG: &str =
    "Speak Italian with a warm, natural voice. Keep answers short and TTS-friendly: \
     no bullet points, no numbered lists, say 'euro' instead of the currency symbol \
     and 'più' instead of '+'.";
