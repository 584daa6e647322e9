// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment.
// ABOUTME: Warnings never change an outcome but are kept on the deployment record.

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warning messages, in the order they were recorded.
    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.message.clone()).collect()
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// The previously active pool could not be drained after promotion.
    pub fn drain_failure(message: impl Into<String>) -> Self {
        Self::new(WarningKind::DrainFailure, message)
    }

    /// The pool being abandoned by a rollback or failure could not be torn down.
    pub fn teardown_failure(message: impl Into<String>) -> Self {
        Self::new(WarningKind::TeardownFailure, message)
    }

    /// Test listener could not be restored.
    pub fn test_listener(message: impl Into<String>) -> Self {
        Self::new(WarningKind::TestListener, message)
    }

    /// Promotion reported an error but production ended up on the new pool.
    pub fn promotion_recovered(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PromotionRecovered, message)
    }

    /// Deployment record could not be persisted.
    pub fn record_save(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RecordSave, message)
    }

    /// Deploy lock could not be released.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    DrainFailure,
    TeardownFailure,
    TestListener,
    PromotionRecovered,
    RecordSave,
    LockRelease,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings_in_order() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::drain_failure("blue drain failed"));
        diag.warn(Warning::record_save("disk full"));

        assert!(diag.has_warnings());
        assert_eq!(diag.messages(), vec!["blue drain failed", "disk full"]);
        assert_eq!(diag.warnings()[0].kind, WarningKind::DrainFailure);
        assert_eq!(diag.warnings()[1].kind, WarningKind::RecordSave);
    }
}
