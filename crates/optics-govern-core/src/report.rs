//! Human-readable and JSON renderings of every run artifact.

use crate::batch::{CallBatch, CallOutcome, ExecutionReport, GasOutcome, GasReport};
use crate::checker::CheckReport;
use crate::domain::Domain;
use crate::registry::DomainRegistry;
use serde::Serialize;
use std::fmt;

/// Everything one run produced, in the order it was produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub check: CheckReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<CallBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<GasReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    /// Check results after execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recheck: Option<CheckReport>,
}

impl AuditReport {
    pub fn new(check: CheckReport) -> Self {
        Self {
            check,
            ..Self::default()
        }
    }

    pub fn render(&self, registry: &DomainRegistry) -> String {
        let mut out = render_check(&self.check, registry);
        if let Some(batch) = &self.batch {
            out.push('\n');
            out.push_str(&render_batch(batch, registry));
        }
        if let Some(gas) = &self.gas {
            out.push('\n');
            out.push_str(&render_gas(gas, registry));
        }
        if let Some(execution) = &self.execution {
            out.push('\n');
            out.push_str(&render_execution(execution, registry));
        }
        if let Some(recheck) = &self.recheck {
            out.push_str("\nafter execution:\n");
            out.push_str(&render_check(recheck, registry));
        }
        out
    }
}

fn label(registry: &DomainRegistry, domain: Domain) -> String {
    match registry.get(domain) {
        Some(deploy) => format!("[{domain} {}]", deploy.name()),
        None => format!("[{domain}]"),
    }
}

/// Domains in registry order, then any the registry does not know.
fn ordered<'a, T>(
    registry: &DomainRegistry,
    entries: impl IntoIterator<Item = (Domain, &'a T)>,
) -> Vec<(Domain, &'a T)>
where
    T: ?Sized + 'a,
{
    let order = registry.domains();
    let mut entries: Vec<_> = entries.into_iter().collect();
    let position = |domain: Domain| {
        order
            .iter()
            .position(|d| *d == domain)
            .unwrap_or(usize::MAX)
    };
    entries.sort_by_key(|(domain, _)| (position(*domain), *domain));
    entries
}

pub fn render_check(report: &CheckReport, registry: &DomainRegistry) -> String {
    CheckView { report, registry }.to_string()
}

pub fn render_batch(batch: &CallBatch, registry: &DomainRegistry) -> String {
    BatchView { batch, registry }.to_string()
}

pub fn render_gas(report: &GasReport, registry: &DomainRegistry) -> String {
    GasView { report, registry }.to_string()
}

pub fn render_execution(report: &ExecutionReport, registry: &DomainRegistry) -> String {
    ExecutionView { report, registry }.to_string()
}

struct CheckView<'a> {
    report: &'a CheckReport,
    registry: &'a DomainRegistry,
}

impl fmt::Display for CheckView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { report, registry } = self;
        if report.is_clean() {
            return writeln!(f, "no violations; every domain read");
        }
        writeln!(f, "violations: {}", report.violations.len())?;
        for violation in &report.violations {
            writeln!(
                f,
                "  {} {} on {}",
                label(registry, violation.domain),
                violation.kind,
                violation.contract
            )?;
            writeln!(f, "    expected {}", violation.expected)?;
            writeln!(f, "    actual   {}", violation.actual)?;
        }
        if !report.failures.is_empty() {
            writeln!(f, "check failures: {}", report.failures.len())?;
            for failure in &report.failures {
                writeln!(
                    f,
                    "  {} {} read at {}: {}",
                    label(registry, failure.domain),
                    failure.invariant,
                    failure.contract,
                    failure.error
                )?;
            }
        }
        Ok(())
    }
}

struct BatchView<'a> {
    batch: &'a CallBatch,
    registry: &'a DomainRegistry,
}

impl fmt::Display for BatchView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { batch, registry } = self;
        writeln!(f, "batch {} ({} calls)", batch.digest(), batch.len())?;
        for (domain, calls) in ordered(registry, batch.iter()) {
            writeln!(f, "{} {} calls", label(registry, domain), calls.len())?;
            for (index, call) in calls.iter().enumerate() {
                writeln!(f, "  #{index} {}", call.description)?;
                match call.method() {
                    Some(method) => writeln!(f, "     to {}: {method}", call.to)?,
                    None => writeln!(f, "     to {}: raw calldata {}", call.to, call.data)?,
                }
            }
        }
        Ok(())
    }
}

struct GasView<'a> {
    report: &'a GasReport,
    registry: &'a DomainRegistry,
}

impl fmt::Display for GasView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { report, registry } = self;
        for (domain, outcomes) in ordered(registry, report.domains.iter().map(|(d, o)| (*d, o))) {
            writeln!(
                f,
                "{} {} gas across {} calls",
                label(registry, domain),
                report.total(domain),
                outcomes.len()
            )?;
            for (index, outcome) in outcomes.iter().enumerate() {
                if let GasOutcome::Failed { error } = outcome {
                    writeln!(f, "  #{index} estimate failed: {error}")?;
                }
            }
        }
        Ok(())
    }
}

struct ExecutionView<'a> {
    report: &'a ExecutionReport,
    registry: &'a DomainRegistry,
}

impl fmt::Display for ExecutionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { report, registry } = self;
        for (domain, outcomes) in ordered(registry, report.domains.iter().map(|(d, o)| (*d, o))) {
            let confirmed = outcomes.iter().filter(|o| o.is_confirmed()).count();
            writeln!(
                f,
                "{} {confirmed}/{} confirmed",
                label(registry, domain),
                outcomes.len()
            )?;
            for (index, outcome) in outcomes.iter().enumerate() {
                match outcome {
                    CallOutcome::Confirmed { receipt } => writeln!(
                        f,
                        "  #{index} confirmed {} in block {}",
                        receipt.tx_hash, receipt.block_number
                    )?,
                    CallOutcome::Failed { error } => writeln!(f, "  #{index} failed: {error}")?,
                    CallOutcome::Abandoned => writeln!(f, "  #{index} abandoned")?,
                }
            }
        }
        if report.is_complete() {
            return writeln!(f, "execution complete");
        }
        let failed: Vec<String> = report
            .failed_domains()
            .iter()
            .map(|d| d.to_string())
            .collect();
        writeln!(f, "execution incomplete; failed domains: {}", failed.join(", "))
    }
}
