//! Sequential plan execution

use crate::error::{AppError, Result};
use crate::inventory::{CloudRemediator, VmTarget};
use nsg_eval::{PlanStep, RemediationAction, RemediationPlan};
use serde::Serialize;
use tracing::{info, warn};

/// The step that stopped execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionFailure {
    pub index: usize,
    pub action: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub total: usize,
    /// Index of the last step applied successfully
    pub last_applied: Option<usize>,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn applied(&self) -> usize {
        self.last_applied.map_or(0, |i| i + 1)
    }
}

/// Applies plan steps one at a time, stopping at the first failure
///
/// Steps already applied are left in place.
pub struct PlanExecutor<'a, R> {
    remediator: &'a R,
    target: &'a VmTarget,
}

impl<'a, R: CloudRemediator> PlanExecutor<'a, R> {
    pub fn new(remediator: &'a R, target: &'a VmTarget) -> Self {
        Self { remediator, target }
    }

    pub async fn execute(&self, plan: &RemediationPlan) -> ExecutionReport {
        let mut report = ExecutionReport {
            total: plan.len(),
            last_applied: None,
            failure: None,
        };

        for (index, step) in plan.steps.iter().enumerate() {
            match self.apply(step).await {
                Ok(()) => {
                    info!(step = index + 1, total = plan.len(), action = %step.action, "step applied");
                    report.last_applied = Some(index);
                }
                Err(e) => {
                    warn!(step = index + 1, action = %step.action, "step failed: {}", e);
                    report.failure = Some(ExecutionFailure {
                        index,
                        action: step.action.describe(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        report
    }

    async fn apply(&self, step: &PlanStep) -> Result<()> {
        match &step.action {
            RemediationAction::StartVm => self.remediator.start_vm(self.target).await,
            action => {
                let nsg = step
                    .nsg
                    .as_deref()
                    .ok_or_else(|| AppError::UntargetedAction(action.describe()))?;
                self.remediator.apply_rule_action(nsg, action).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls and fails on the n-th one
    struct FlakyRemediator {
        fail_at: Option<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl FlakyRemediator {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_at == Some(calls.len()) {
                return Err(AppError::NsgNotFound("flaky".into()));
            }
            calls.push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl CloudRemediator for FlakyRemediator {
        async fn start_vm(&self, target: &VmTarget) -> Result<()> {
            self.record(format!("start {}", target.vm))
        }

        async fn apply_rule_action(&self, nsg: &str, action: &RemediationAction) -> Result<()> {
            self.record(format!("{}: {}", nsg, action))
        }
    }

    fn plan() -> RemediationPlan {
        let raise = |name: &str| PlanStep {
            nsg: Some("nsg".into()),
            action: RemediationAction::RaiseRulePriority {
                rule_name: name.into(),
                old_priority: 200,
                new_priority: 150,
            },
            justification: String::new(),
        };
        RemediationPlan {
            steps: vec![
                PlanStep {
                    nsg: None,
                    action: RemediationAction::StartVm,
                    justification: String::new(),
                },
                raise("A"),
                raise("B"),
            ],
        }
    }

    #[tokio::test]
    async fn test_all_steps_applied_in_order() {
        let remediator = FlakyRemediator::new(None);
        let target = VmTarget::new("rg", "vm");
        let report = PlanExecutor::new(&remediator, &target).execute(&plan()).await;

        assert!(report.succeeded());
        assert_eq!(report.applied(), 3);
        assert_eq!(report.last_applied, Some(2));
        let calls = remediator.calls.lock().unwrap();
        assert_eq!(calls[0], "start vm");
        assert!(calls[1].contains("Move rule A"));
        assert!(calls[2].contains("Move rule B"));
    }

    #[tokio::test]
    async fn test_first_failure_aborts() {
        let remediator = FlakyRemediator::new(Some(1));
        let target = VmTarget::new("rg", "vm");
        let report = PlanExecutor::new(&remediator, &target).execute(&plan()).await;

        assert!(!report.succeeded());
        assert_eq!(report.last_applied, Some(0));
        let failure = report.failure.unwrap();
        assert_eq!(failure.index, 1);
        assert!(failure.action.contains("Move rule A"));
        // Nothing after the failed step is attempted
        assert_eq!(remediator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_on_first_step() {
        let remediator = FlakyRemediator::new(Some(0));
        let target = VmTarget::new("rg", "vm");
        let report = PlanExecutor::new(&remediator, &target).execute(&plan()).await;
        assert_eq!(report.last_applied, None);
        assert_eq!(report.applied(), 0);
    }

    #[tokio::test]
    async fn test_rule_step_without_nsg_fails() {
        let remediator = FlakyRemediator::new(None);
        let target = VmTarget::new("rg", "vm");
        let mut plan = plan();
        plan.steps[1].nsg = None;
        let report = PlanExecutor::new(&remediator, &target).execute(&plan).await;
        assert_eq!(report.failure.unwrap().index, 1);
    }
}
