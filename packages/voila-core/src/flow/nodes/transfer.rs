//! Operator transfer node.
//!
//! Terminal node of the conversational flow: the agent announces the
//! handoff and the actual media teardown happens through the out-of-band
//! escalation endpoint.

use crate::flow::node::NodeConfig;
use crate::flow::nodes::LANGUAGE_CONFIG;

/// Why the session is being handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferReason {
    /// The caller asked for an operator.
    UserRequest,
    /// The info tools could not answer.
    KnowledgeGap,
    /// Repeated technical failures.
    Technical,
}

impl TransferReason {
    fn announcement(&self) -> &'static str {
        match self {
            Self::UserRequest => {
                "Say: 'Va bene, ti metto in contatto con un operatore. Resta in linea.'"
            }
            Self::KnowledgeGap => {
                "Say: 'Non ho trovato questa informazione. Ti metto in contatto con \
                 un operatore che potrà aiutarti. Resta in linea.'"
            }
            Self::Technical => {
                "Say: 'Mi dispiace, c'è un problema tecnico. Ti trasferisco a un \
                 operatore. Resta in linea.'"
            }
        }
    }
}

/// Builds the transfer announcement node.
pub fn create_transfer_node(reason: TransferReason) -> NodeConfig {
    NodeConfig::named("transfer")
        .role(format!(
            "The call is being handed to a human operator. Announce the transfer \
             briefly and reassuringly, then stop talking. {LANGUAGE_CONFIG}"
        ))
        .task(reason.announcement())
        .respond_immediately()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technical_transfer_mentions_the_problem() {
        let node = create_transfer_node(TransferReason::Technical);
        assert!(node.task_messages[0].contains("problema tecnico"));
        assert!(node.respond_immediately);
    }
}
