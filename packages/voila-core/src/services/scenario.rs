//! Booking scenario classification.
//!
//! The sorting endpoint answers with appointment groups; how those groups
//! map to slots is fully determined by their shape, so the classification is
//! computed directly:
//!
//! - one group marked as a bundle -> `bundle` (one appointment, all services)
//! - one plain group -> `combined` (one appointment, a replacement or single
//!   service)
//! - two or more groups -> `separate` (one appointment each)
//!
//! A readable reasoning string is synthesized alongside, matching what an
//! operator sees in the call summary.

use crate::services::types::{BookingScenario, ServiceGroup};

/// The classification plus its operator-facing explanation.
#[derive(Debug, Clone)]
pub struct ScenarioInterpretation {
    pub scenario: BookingScenario,
    pub reasoning: String,
    pub num_appointments: usize,
    pub service_summary: String,
}

/// Classifies parsed sorting groups into a booking scenario.
pub fn interpret_sorting(groups: &[ServiceGroup]) -> ScenarioInterpretation {
    let total_services: usize = groups.iter().map(|g| g.services.len()).sum();

    let interpretation = match groups {
        [only] if only.is_group => ScenarioInterpretation {
            scenario: BookingScenario::Bundle,
            reasoning: format!(
                "A single group with group=true: its {} services are booked \
                 together in one appointment.",
                only.services.len()
            ),
            num_appointments: 1,
            service_summary: format!(
                "{} in one appointment",
                join_names(&only.services)
            ),
        },
        [only] => ScenarioInterpretation {
            scenario: BookingScenario::Combined,
            reasoning: "A single group with group=false: one appointment for the \
                        combined or single service."
                .to_string(),
            num_appointments: 1,
            service_summary: format!("{} in one appointment", join_names(&only.services)),
        },
        _ => ScenarioInterpretation {
            scenario: BookingScenario::Separate,
            reasoning: format!(
                "{} groups returned: each group needs its own appointment slot.",
                groups.len()
            ),
            num_appointments: groups.len(),
            service_summary: format!(
                "{} services across {} separate appointments",
                total_services,
                groups.len()
            ),
        },
    };

    log::info!(
        "[Scenario] {} -> {} appointment(s): {}",
        interpretation.scenario.as_str(),
        interpretation.num_appointments,
        interpretation.service_summary
    );

    interpretation
}

fn join_names(services: &[crate::services::types::HealthService]) -> String {
    services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::types::{HealthService, Sector};

    fn svc(name: &str) -> HealthService {
        HealthService {
            uuid: format!("uuid-{}", name),
            name: name.to_string(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }
    }

    fn group(names: &[&str], is_group: bool) -> ServiceGroup {
        ServiceGroup {
            services: names.iter().map(|n| svc(n)).collect(),
            is_group,
        }
    }

    #[test]
    fn single_bundled_group_is_bundle() {
        let interpretation = interpret_sorting(&[group(&["Analisi", "Urine"], true)]);
        assert_eq!(interpretation.scenario, BookingScenario::Bundle);
        assert_eq!(interpretation.num_appointments, 1);
        assert!(interpretation.service_summary.contains("Analisi + Urine"));
    }

    #[test]
    fn single_plain_group_is_combined() {
        let interpretation = interpret_sorting(&[group(&["Pacchetto Completo"], false)]);
        assert_eq!(interpretation.scenario, BookingScenario::Combined);
        assert_eq!(interpretation.num_appointments, 1);
    }

    #[test]
    fn multiple_groups_are_separate_regardless_of_flags() {
        let interpretation =
            interpret_sorting(&[group(&["RX"], true), group(&["Visita"], false)]);
        assert_eq!(interpretation.scenario, BookingScenario::Separate);
        assert_eq!(interpretation.num_appointments, 2);
        assert!(interpretation.reasoning.contains("2 groups"));
    }
}
