use crate::cli::SourceArgs;
use crate::support::{
    check_or_exit, exit_with, load_workspace_or_exit, or_exit, print_report,
    violation_expectations_or_exit,
};
use optics_govern_core::AuditReport;

pub async fn run(source: SourceArgs, expect: Vec<String>, json: bool) {
    let workspace = load_workspace_or_exit(&source);
    let (types, counts) = violation_expectations_or_exit(&expect);

    let checker = check_or_exit(&workspace).await;
    let report = or_exit(checker.report()).clone();
    print_report("check", &AuditReport::new(report), &workspace.registry, json);

    if let Err(e) = checker.expect_violations(&types, &counts) {
        exit_with(e);
    }
}
