use crate::cli::PlanArgs;
use crate::commands::plan::{Planned, plan_or_exit};
use crate::support::{check_or_exit, exit_with, or_exit, print_report};

pub async fn run(args: PlanArgs) {
    let Planned {
        workspace,
        mut builder,
        mut audit,
    } = plan_or_exit("simulate", &args).await;

    let execution = or_exit(builder.execute().await);
    let recheck = check_or_exit(&workspace).await;
    audit.recheck = Some(or_exit(recheck.report()).clone());
    audit.execution = Some(execution.clone());
    print_report("simulate", &audit, &workspace.registry, args.json);

    if !execution.is_complete() {
        let failed: Vec<String> = execution
            .failed_domains()
            .iter()
            .map(|d| d.to_string())
            .collect();
        exit_with(format!(
            "execution incomplete on domains {}",
            failed.join(", ")
        ));
    }
}
