//! Informational lookup boundary.
//!
//! The knowledge base, pricing graph, and clinic directory answering the
//! global info tools are external systems. The flow engine consumes them
//! through [`InfoBackend`]; `Ok(None)` means "no answer", which the flow
//! treats as a knowledge gap and converts into a transfer offer.

use async_trait::async_trait;

use crate::error::BridgeResult;

/// Answers for the global informational tools.
#[async_trait]
pub trait InfoBackend: Send + Sync {
    /// Free-form FAQ lookup (preparations, documents, booking process).
    async fn knowledge_base(&self, query: &str) -> BridgeResult<Option<String>>;

    /// Agonistic sports-visit pricing for age, gender, sport, region.
    async fn competitive_pricing(
        &self,
        age: u32,
        gender: &str,
        sport: &str,
        region: &str,
    ) -> BridgeResult<Option<String>>;

    /// Non-agonistic visit pricing.
    async fn non_agonistic_price(&self) -> BridgeResult<Option<String>>;

    /// Exams required for a visit type code (A1-A3, B1-B5).
    async fn exams_by_visit(&self, visit_code: &str) -> BridgeResult<Option<String>>;

    /// Exams required for a specific sport.
    async fn exams_by_sport(&self, sport: &str) -> BridgeResult<Option<String>>;

    /// Clinic hours, closures, blood collection times.
    async fn clinic_info(&self, query: &str) -> BridgeResult<Option<String>>;
}

/// Backend with no data sources attached; every lookup is a knowledge gap.
pub struct NoInfoBackend;

#[async_trait]
impl InfoBackend for NoInfoBackend {
    async fn knowledge_base(&self, _query: &str) -> BridgeResult<Option<String>> {
        Ok(None)
    }
    async fn competitive_pricing(
        &self,
        _age: u32,
        _gender: &str,
        _sport: &str,
        _region: &str,
    ) -> BridgeResult<Option<String>> {
        Ok(None)
    }
    async fn non_agonistic_price(&self) -> BridgeResult<Option<String>> {
        Ok(None)
    }
    async fn exams_by_visit(&self, _visit_code: &str) -> BridgeResult<Option<String>> {
        Ok(None)
    }
    async fn exams_by_sport(&self, _sport: &str) -> BridgeResult<Option<String>> {
        Ok(None)
    }
    async fn clinic_info(&self, _query: &str) -> BridgeResult<Option<String>> {
        Ok(None)
    }
}

/// Canned answers for tests.
#[derive(Default)]
pub struct StaticInfoBackend {
    pub knowledge_answer: Option<String>,
    pub pricing_answer: Option<String>,
    pub clinic_answer: Option<String>,
}

#[async_trait]
impl InfoBackend for StaticInfoBackend {
    async fn knowledge_base(&self, _query: &str) -> BridgeResult<Option<String>> {
        Ok(self.knowledge_answer.clone())
    }
    async fn competitive_pricing(
        &self,
        _age: u32,
        _gender: &str,
        _sport: &str,
        _region: &str,
    ) -> BridgeResult<Option<String>> {
        Ok(self.pricing_answer.clone())
    }
    async fn non_agonistic_price(&self) -> BridgeResult<Option<String>> {
        Ok(self.pricing_answer.clone())
    }
    async fn exams_by_visit(&self, _visit_code: &str) -> BridgeResult<Option<String>> {
        Ok(self.knowledge_answer.clone())
    }
    async fn exams_by_sport(&self, _sport: &str) -> BridgeResult<Option<String>> {
        Ok(self.knowledge_answer.clone())
    }
    async fn clinic_info(&self, _query: &str) -> BridgeResult<Option<String>> {
        Ok(self.clinic_answer.clone())
    }
}
