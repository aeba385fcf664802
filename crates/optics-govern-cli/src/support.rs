use crate::cli::SourceArgs;
use optics_govern_core::{
    AuditReport, Domain, DomainRegistry, FixtureNetwork, FixtureSnapshot, GovernConfig,
    InvariantChecker, RunOptions, ViolationType,
};
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Registry plus the chains a run talks to.
pub struct Workspace {
    pub registry: Arc<DomainRegistry>,
    pub network: FixtureNetwork,
    pub options: RunOptions,
}

pub fn exit_with(message: impl Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| exit_with(e))
}

pub fn load_workspace_or_exit(source: &SourceArgs) -> Workspace {
    let config = or_exit(GovernConfig::load(&source.config));
    let options = config.settings.run_options();
    let registry = Arc::new(or_exit(config.into_registry()));
    let snapshot = or_exit(FixtureSnapshot::load(&source.state));
    let network = or_exit(FixtureNetwork::from_snapshot(&registry, &snapshot));
    info!(
        domains = registry.len(),
        config = %source.config,
        state = %source.state,
        "loaded deploys and state snapshot"
    );
    Workspace {
        registry,
        network,
        options,
    }
}

/// Run every invariant check and hand back the checked checker.
pub async fn check_or_exit(workspace: &Workspace) -> InvariantChecker {
    let mut checker = or_exit(InvariantChecker::new(
        Arc::clone(&workspace.registry),
        workspace.network.chain_set(),
    ))
    .with_options(workspace.options);
    or_exit(checker.check_deploys().await);
    checker
}

/// Split `KEY=N` into its parsed key and count.
pub fn parse_pair<K>(item: &str) -> Result<(K, usize), String>
where
    K: FromStr,
    K::Err: Display,
{
    let (key, count) = item
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=N, got `{item}`"))?;
    let key = key.trim().parse::<K>().map_err(|e| e.to_string())?;
    let count = count
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid count in `{item}`: {e}"))?;
    Ok((key, count))
}

pub fn parse_pairs<K>(items: &[String]) -> Result<(Vec<K>, Vec<usize>), String>
where
    K: FromStr,
    K::Err: Display,
{
    let mut keys = Vec::with_capacity(items.len());
    let mut counts = Vec::with_capacity(items.len());
    for item in items {
        let (key, count) = parse_pair(item)?;
        keys.push(key);
        counts.push(count);
    }
    Ok((keys, counts))
}

pub fn violation_expectations_or_exit(items: &[String]) -> (Vec<ViolationType>, Vec<usize>) {
    parse_pairs(items).unwrap_or_else(|e| exit_with(format!("--expect: {e}")))
}

/// `--expect-calls N` applies to every domain; otherwise the per-domain pairs.
pub fn call_expectations_or_exit(
    registry: &DomainRegistry,
    every: Option<usize>,
    per_domain: &[String],
) -> (Vec<Domain>, Vec<usize>) {
    match every {
        Some(count) => {
            let domains = registry.domains();
            let counts = vec![count; domains.len()];
            (domains, counts)
        }
        None => parse_pairs(per_domain)
            .unwrap_or_else(|e| exit_with(format!("--expect-calls-per: {e}"))),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    let text = or_exit(serde_json::to_string_pretty(value));
    println!("{text}");
}

pub fn print_report(title: &str, report: &AuditReport, registry: &DomainRegistry, json: bool) {
    if json {
        print_json(report);
    } else {
        println!("optics-govern {title}");
        println!("  Domains: {}", registry.len());
        if let Some(digest) = &report.digest {
            println!("  Batch digest: {digest}");
        }
        println!();
        print!("{}", report.render(registry));
    }
}

/// Print what the run produced so far, then fail with `error`.
pub fn fail_with_report(
    title: &str,
    report: &AuditReport,
    registry: &DomainRegistry,
    json: bool,
    error: impl Display,
) -> ! {
    print_report(title, report, registry, json);
    exit_with(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_domain_pairs() {
        assert_eq!(
            parse_pair::<ViolationType>("UpgradeBeacon=4"),
            Ok((ViolationType::UpgradeBeacon, 4))
        );
        assert_eq!(parse_pair::<Domain>(" 1000 = 2 "), Ok((Domain(1000), 2)));
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_pair::<Domain>("1000").is_err());
        assert!(parse_pair::<Domain>("abc=1").is_err());
        assert!(parse_pair::<ViolationType>("Owner=-1").is_err());
    }

    #[test]
    fn pairs_keep_their_order() {
        let items = vec!["2000=1".to_string(), "1000=3".to_string()];
        let (domains, counts) = parse_pairs::<Domain>(&items).expect("valid pairs");
        assert_eq!(domains, vec![Domain(2000), Domain(1000)]);
        assert_eq!(counts, vec![1, 3]);
    }
}
