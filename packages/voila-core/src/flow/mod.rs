//! The conversational flow engine.
//!
//! A graph of nodes (see [`nodes`]) drives a guided booking dialog; the
//! [`manager::FlowManager`] executes the current node against the speech
//! stack and dispatches tool calls to the [`handlers`]. Handlers are pure
//! over the [`state::FlowState`] plus the injected services and return a
//! result together with a [`node::Transition`].

pub mod global;
pub mod handlers;
pub mod manager;
pub mod node;
pub mod nodes;
pub mod state;

use std::sync::Arc;

use crate::services::directory::DirectoryApi;
use crate::services::fuzzy::FuzzySearch;
use crate::services::info::InfoBackend;
use crate::services::speech::SpeechServices;

/// Backends the handlers reach during a dialog.
pub struct FlowServices {
    pub directory: Arc<dyn DirectoryApi>,
    pub search: Arc<FuzzySearch>,
    pub info: Arc<dyn InfoBackend>,
}

/// Everything a handler sees for one tool call.
pub struct FlowContext<'a> {
    pub state: &'a mut state::FlowState,
    pub services: &'a FlowServices,
    pub speech: &'a Arc<dyn SpeechServices>,
}

/// A handler's payload: the function-result value reflected to the agent
/// plus where the dialog goes next.
pub type HandlerOutcome = (serde_json::Value, node::Transition);

/// Result type of every handler.
pub type HandlerResult = crate::error::BridgeResult<HandlerOutcome>;

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared harness for handler tests: a flow state plus mock backends.

    use std::sync::Arc;

    use super::{FlowContext, FlowServices};
    use crate::flow::state::FlowState;
    use crate::services::catalog::ServiceCatalog;
    use crate::services::fuzzy::FuzzySearch;
    use crate::services::info::StaticInfoBackend;
    use crate::services::mock::MockDirectory;
    use crate::services::speech::{ScriptedSpeech, SpeechServices};
    use crate::services::types::HealthService;

    pub(crate) struct TestHarness {
        pub state: FlowState,
        pub services: FlowServices,
        pub speech: Arc<dyn SpeechServices>,
        pub directory: Arc<MockDirectory>,
        pub speech_log: Arc<ScriptedSpeech>,
    }

    impl TestHarness {
        pub fn context(&mut self) -> FlowContext<'_> {
            FlowContext {
                state: &mut self.state,
                services: &self.services,
                speech: &self.speech,
            }
        }
    }

    pub(crate) fn test_context(catalog: Vec<HealthService>) -> TestHarness {
        test_context_with(catalog, MockDirectory::default(), StaticInfoBackend::default())
    }

    pub(crate) fn test_context_with(
        catalog: Vec<HealthService>,
        directory: MockDirectory,
        info: StaticInfoBackend,
    ) -> TestHarness {
        let directory = Arc::new(directory);
        let speech_log = Arc::new(ScriptedSpeech::new(Vec::new()));
        let services = FlowServices {
            directory: directory.clone(),
            search: Arc::new(FuzzySearch::new(Arc::new(ServiceCatalog::with_services(
                catalog,
            )))),
            info: Arc::new(info),
        };
        TestHarness {
            state: FlowState::new("open", Some("+393331234567".to_string())),
            services,
            speech: speech_log.clone(),
            directory,
            speech_log,
        }
    }
}
