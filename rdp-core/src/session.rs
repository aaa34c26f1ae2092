//! One inspect-evaluate-plan-remediate-confirm pass over a VM

use crate::error::Result;
use crate::executor::{ExecutionReport, PlanExecutor};
use crate::inventory::{CloudInventory, CloudRemediator, NetworkAddresses, VmTarget};
use chrono::Utc;
use nsg_eval::{
    evaluate_layers, LayeredVerdict, NsgLayer, Planner, PowerState, RemediationPlan,
    TrafficDescriptor,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Inspecting,
    Evaluating,
    Reachable,
    PlanningRemediation,
    PlanReady,
    Executing,
    Confirming,
    Remediated,
    StillUnreachable,
    RemediationFailed,
    PlanningFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Reachable
                | SessionState::PlanReady
                | SessionState::Remediated
                | SessionState::StillUnreachable
                | SessionState::RemediationFailed
                | SessionState::PlanningFailed
        )
    }

    /// Process exit code for a session that ended in this state
    pub fn exit_code(self) -> i32 {
        match self {
            SessionState::Reachable | SessionState::Remediated => 0,
            SessionState::PlanReady => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Inspecting => "inspecting",
            SessionState::Evaluating => "evaluating",
            SessionState::Reachable => "reachable",
            SessionState::PlanningRemediation => "planning remediation",
            SessionState::PlanReady => "plan ready",
            SessionState::Executing => "executing",
            SessionState::Confirming => "confirming",
            SessionState::Remediated => "remediated",
            SessionState::StillUnreachable => "still unreachable",
            SessionState::RemediationFailed => "remediation failed",
            SessionState::PlanningFailed => "planning failed",
        };
        write!(f, "{}", s)
    }
}

/// Everything observed and done during a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: String,
    pub target: VmTarget,
    pub traffic: TrafficDescriptor,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<NetworkAddresses>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<LayeredVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<RemediationPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_power_state: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<LayeredVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }
}

/// Drives a single pass over one VM
///
/// Nothing is carried between sessions; every run reads current state.
pub struct Session<'a, C> {
    cloud: &'a C,
    planner: Planner,
    auto_fix: bool,
    report: SessionReport,
}

impl<'a, C: CloudInventory + CloudRemediator> Session<'a, C> {
    pub fn new(cloud: &'a C, target: VmTarget, planner: Planner) -> Self {
        let now = Utc::now();
        let report = SessionReport {
            session_id: format!("rdp_session_{}", now.format("%Y%m%d_%H%M%S")),
            started_at: now.to_rfc3339(),
            target,
            traffic: *planner.traffic(),
            state: SessionState::Inspecting,
            power_state: None,
            addresses: None,
            verdict: None,
            plan: None,
            execution: None,
            final_power_state: None,
            confirmation: None,
            error: None,
            warnings: Vec::new(),
        };
        Self {
            cloud,
            planner,
            auto_fix: false,
            report,
        }
    }

    /// Apply the plan and confirm the result instead of stopping at the plan
    pub fn with_auto_fix(mut self, auto_fix: bool) -> Self {
        self.auto_fix = auto_fix;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.report.session_id
    }

    pub async fn run(mut self) -> Result<SessionReport> {
        info!(session = %self.report.session_id, vm = %self.report.target, "session started");

        let (power, addresses, layers) = self.inspect().await?;
        self.report.power_state = Some(power);
        self.report.addresses = Some(addresses);

        self.transition(SessionState::Evaluating);
        let verdict = evaluate_layers(&layers, &self.report.traffic)?;
        let reachable = verdict.is_allowed() && power.is_running();
        info!(reachability = %verdict.reachability, power = %power, "initial verdict");
        self.report.verdict = Some(verdict);

        if reachable {
            return Ok(self.finish(SessionState::Reachable));
        }

        self.transition(SessionState::PlanningRemediation);
        let plan = match self.planner.plan(power, &layers) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("planning failed: {}", e);
                self.report.error = Some(e.to_string());
                return Ok(self.finish(SessionState::PlanningFailed));
            }
        };
        self.report.plan = Some(plan.clone());
        self.transition(SessionState::PlanReady);

        if !self.auto_fix {
            return Ok(self.finish(SessionState::PlanReady));
        }

        self.transition(SessionState::Executing);
        let execution = PlanExecutor::new(self.cloud, &self.report.target)
            .execute(&plan)
            .await;
        let succeeded = execution.succeeded();
        self.report.execution = Some(execution);
        if !succeeded {
            return Ok(self.finish(SessionState::RemediationFailed));
        }

        self.transition(SessionState::Confirming);
        let (power, addresses, layers) = self.inspect().await?;
        self.report.addresses = Some(addresses);
        let confirmation = evaluate_layers(&layers, &self.report.traffic)?;
        let reachable = confirmation.is_allowed() && power.is_running();
        self.report.final_power_state = Some(power);
        self.report.confirmation = Some(confirmation);

        if reachable {
            Ok(self.finish(SessionState::Remediated))
        } else {
            warn!("still unreachable after remediation");
            Ok(self.finish(SessionState::StillUnreachable))
        }
    }

    /// Read power state, addresses and security groups concurrently
    async fn inspect(&self) -> Result<(PowerState, NetworkAddresses, Vec<NsgLayer>)> {
        let target = &self.report.target;
        let (power, addresses, layers) = tokio::join!(
            self.cloud.power_state(target),
            self.cloud.network_addresses(target),
            self.cloud.network_security_groups(target)
        );
        let (power, addresses, layers) = (power?, addresses?, layers?);
        debug!(%power, %addresses, layers = layers.len(), "inspected");
        Ok((power, addresses, layers))
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.report.state, to = %next, "session state");
        self.report.state = next;
    }

    fn finish(mut self, state: SessionState) -> SessionReport {
        let reachable = matches!(state, SessionState::Reachable | SessionState::Remediated);
        let no_public_ip = self.report.addresses.is_some_and(|a| a.public_ip.is_none());
        if reachable && no_public_ip {
            warn!(vm = %self.report.target, "no public IP address on the network interface");
            self.report.warnings.push(
                "the VM has no public IP address; RDP is only reachable from inside its virtual network"
                    .to_string(),
            );
        }
        self.transition(state);
        info!(session = %self.report.session_id, state = %state, "session finished");
        self.report
    }
}
