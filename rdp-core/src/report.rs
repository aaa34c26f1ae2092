//! Rendering of session reports

use crate::config::OutputFormat;
use crate::error::Result;
use crate::session::{SessionReport, SessionState};
use nsg_eval::LayeredVerdict;
use std::fmt;

/// Render a report in the requested format
pub fn render(report: &SessionReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(ConsoleReport(report).to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Human-readable report for the terminal
pub struct ConsoleReport<'a>(pub &'a SessionReport);

impl ConsoleReport<'_> {
    fn write_verdict(f: &mut fmt::Formatter<'_>, verdict: &LayeredVerdict) -> fmt::Result {
        if verdict.layers.is_empty() {
            writeln!(f, "  no network security group attached; traffic is not filtered")?;
        }
        for layer in &verdict.layers {
            writeln!(
                f,
                "  [{}] {}: {} ({})",
                layer.scope,
                layer.nsg,
                layer.verdict.reachability,
                layer.verdict.explanation()
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ConsoleReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;

        writeln!(f, "RDP reachability for {}", report.target)?;
        if let Some(subscription) = &report.target.subscription_id {
            writeln!(f, "Subscription: {}", subscription)?;
        }
        writeln!(f, "Session:      {}", report.session_id)?;
        writeln!(f, "Traffic:      {}", report.traffic)?;
        if let Some(power) = report.power_state {
            writeln!(f, "Power state:  {}", power)?;
        }
        if let Some(addresses) = report.addresses {
            writeln!(f, "Addresses:    {}", addresses)?;
        }

        if let Some(verdict) = &report.verdict {
            writeln!(f)?;
            writeln!(f, "Security groups:")?;
            Self::write_verdict(f, verdict)?;
        }

        if let Some(plan) = &report.plan {
            writeln!(f)?;
            writeln!(f, "Remediation plan:")?;
            for (i, step) in plan.steps.iter().enumerate() {
                match &step.nsg {
                    Some(nsg) => writeln!(f, "  {}. [{}] {}", i + 1, nsg, step.action)?,
                    None => writeln!(f, "  {}. {}", i + 1, step.action)?,
                }
                writeln!(f, "     {}", step.justification)?;
            }
        }

        if let Some(execution) = &report.execution {
            writeln!(f)?;
            writeln!(
                f,
                "Execution: {}/{} steps applied",
                execution.applied(),
                execution.total
            )?;
            if let Some(failure) = &execution.failure {
                writeln!(
                    f,
                    "  step {} failed ({}): {}",
                    failure.index + 1,
                    failure.action,
                    failure.error
                )?;
            }
        }

        if let Some(confirmation) = &report.confirmation {
            writeln!(f)?;
            writeln!(f, "After remediation:")?;
            if let Some(power) = report.final_power_state {
                writeln!(f, "  power state: {}", power)?;
            }
            Self::write_verdict(f, confirmation)?;
        }

        if let Some(error) = &report.error {
            writeln!(f)?;
            writeln!(f, "Error: {}", error)?;
        }

        for warning in &report.warnings {
            writeln!(f)?;
            writeln!(f, "Warning: {}", warning)?;
        }

        writeln!(f)?;
        let outcome = match report.state {
            SessionState::Reachable => "RDP is reachable",
            SessionState::PlanReady => "RDP is not reachable; rerun with --auto-fix to apply the plan",
            SessionState::Remediated => "RDP is reachable after remediation",
            SessionState::StillUnreachable => "RDP is still not reachable after remediation",
            SessionState::RemediationFailed => "remediation stopped at a failed step",
            SessionState::PlanningFailed => "no remediation could be planned",
            _ => "session did not finish",
        };
        write!(f, "Result: {}", outcome)
    }
}
