use crate::cli::PlanArgs;
use crate::support::{
    Workspace, call_expectations_or_exit, check_or_exit, exit_with, fail_with_report,
    load_workspace_or_exit, or_exit, print_report, violation_expectations_or_exit,
};
use optics_govern_core::{
    AuditReport, GovernanceCallBatchBuilder, transfer_replica_ownership_calls,
};
use std::sync::Arc;

/// A verified, built, and gas-estimated batch.
pub struct Planned {
    pub workspace: Workspace,
    pub builder: GovernanceCallBatchBuilder,
    pub audit: AuditReport,
}

/// Check, gate violations, build, gate call counts, estimate gas. Any gate
/// failure prints what was produced so far and exits.
pub async fn plan_or_exit(title: &str, args: &PlanArgs) -> Planned {
    let workspace = load_workspace_or_exit(&args.source);
    let registry = Arc::clone(&workspace.registry);
    let (types, counts) = violation_expectations_or_exit(&args.expect);

    let checker = check_or_exit(&workspace).await;
    let report = or_exit(checker.report()).clone();
    let mut audit = AuditReport::new(report.clone());
    if let Err(e) = checker.expect_violations(&types, &counts) {
        fail_with_report(title, &audit, &registry, args.json, e);
    }

    let mut builder = or_exit(GovernanceCallBatchBuilder::new(
        Arc::clone(&registry),
        workspace.network.chain_set(),
        &report.violations,
    ))
    .with_options(workspace.options);
    if args.transfer_replica_ownership {
        for call in transfer_replica_ownership_calls(&registry) {
            or_exit(builder.push(call.domain, call));
        }
    }

    or_exit(builder.build().await);
    audit.batch = Some(builder.batch().clone());
    audit.digest = Some(builder.digest());

    let (domains, counts) =
        call_expectations_or_exit(&registry, args.expect_calls, &args.expect_calls_per);
    if let Err(e) = builder.expect_calls(&domains, &counts) {
        fail_with_report(title, &audit, &registry, args.json, e);
    }

    audit.gas = Some(or_exit(builder.estimate_gas().await));
    Planned {
        workspace,
        builder,
        audit,
    }
}

pub async fn run(args: PlanArgs) {
    let planned = plan_or_exit("plan", &args).await;
    print_report("plan", &planned.audit, &planned.workspace.registry, args.json);

    let failed = planned
        .audit
        .gas
        .as_ref()
        .map_or(0, |gas| gas.failures().len());
    if failed > 0 {
        exit_with(format!("gas estimation failed for {failed} calls"));
    }
}
