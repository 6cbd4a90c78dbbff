use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use ptree_core::PtreeConfig;
use ptree_kernel::{materialize, LayoutEngine, OrphanPolicy};
use ptree_model::Tree;
use ptree_parser::ResponseParser;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn input_arg(help: &'static str) -> Arg {
    Arg::new("input")
        .long("input")
        .short('i')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn reparent_arg() -> Arg {
    Arg::new("reparent")
        .long("reparent")
        .action(ArgAction::SetTrue)
        .help("Re-attach orphans to the root instead of dropping them")
}

fn cli() -> Command {
    Command::new("ptree")
        .version(ptree_core::VERSION)
        .about("Prompt refinement trees: parse generator output, check and lay out trees")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(
            Command::new("parse")
                .about("Print the candidates found in a generator response as JSON")
                .arg(input_arg("File holding the raw generator response")),
        )
        .subcommand(
            Command::new("check")
                .about("Validate a tree's invariants and report orphans")
                .arg(input_arg("Tree as JSON"))
                .arg(reparent_arg()),
        )
        .subcommand(
            Command::new("layout")
                .about("Materialize and lay out a tree, printing node positions")
                .arg(input_arg("Tree as JSON"))
                .arg(reparent_arg()),
        )
}

fn load_config(matches: &ArgMatches) -> Result<PtreeConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PtreeConfig::from_toml_file(path)?,
        None => PtreeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn read_input(args: &ArgMatches) -> Result<String> {
    let path = args
        .get_one::<PathBuf>("input")
        .context("--input is required")?;
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_tree(args: &ArgMatches) -> Result<Tree> {
    serde_json::from_str(&read_input(args)?).context("input is not a tree document")
}

fn orphan_policy(args: &ArgMatches, config: &PtreeConfig) -> OrphanPolicy {
    if args.get_flag("reparent") {
        OrphanPolicy::Reparent
    } else {
        config.orphan_policy
    }
}

/// JSON report for stdout and whether the run counts as a success
#[derive(Debug)]
struct Outcome {
    report: Value,
    ok: bool,
}

fn parse(args: &ArgMatches) -> Result<Outcome> {
    let report = ResponseParser::new().parse_detailed(&read_input(args)?);
    Ok(Outcome {
        ok: !report.candidates.is_empty(),
        report: json!({
            "format": report.format,
            "skippedReserved": report.skipped_reserved,
            "skippedBlank": report.skipped_blank,
            "candidates": report.candidates,
        }),
    })
}

fn check(args: &ArgMatches, config: &PtreeConfig) -> Result<Outcome> {
    let tree = read_tree(args)?;
    let invariants = tree.check_invariants();
    let materialized = materialize(&tree.nodes, orphan_policy(args, config))?;

    Ok(Outcome {
        ok: invariants.is_ok() && materialized.is_clean(),
        report: json!({
            "nodes": tree.len(),
            "reachable": materialized.nodes.len(),
            "valid": invariants.is_ok(),
            "violation": invariants.as_ref().err().map(ToString::to_string),
            "orphans": materialized.orphans,
            "reparented": materialized.reparented,
        }),
    })
}

fn layout(args: &ArgMatches, config: &PtreeConfig) -> Result<Outcome> {
    let loaded = read_tree(args)?;
    let materialized = materialize(&loaded.nodes, orphan_policy(args, config))?;
    let mut tree = Tree::from_parts(loaded.id, loaded.name, materialized.nodes, loaded.edges);
    tree.rebuild_edges();
    let layout = LayoutEngine::new(config.layout.clone()).apply(&mut tree)?;

    let placements: Vec<_> = layout
        .placements()
        .iter()
        .map(|p| json!({ "id": p.id, "rank": p.rank, "order": p.order, "x": p.position.x, "y": p.position.y }))
        .collect();
    Ok(Outcome {
        ok: true,
        report: json!({
            "depth": layout.depth(),
            "placements": placements,
            "orphans": materialized.orphans,
        }),
    })
}

fn run(matches: &ArgMatches, config: &PtreeConfig) -> Result<Option<Outcome>> {
    let outcome = match matches.subcommand() {
        Some(("parse", args)) => parse(args)?,
        Some(("check", args)) => check(args, config)?,
        Some(("layout", args)) => layout(args, config)?,
        _ => return Ok(None),
    };
    Ok(Some(outcome))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    if let Some(outcome) = run(&matches, &config)? {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        std::process::exit(i32::from(!outcome.ok));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptree_model::{Node, NodeId};
    use ptree_test_utils::{improvement_response, two_level_tree};
    use std::path::Path;

    fn write_tree(dir: &Path, tree: &Tree) -> PathBuf {
        let path = dir.join("tree.json");
        std::fs::write(&path, serde_json::to_string(tree).unwrap()).unwrap();
        path
    }

    /// Root, child and grandchild plus one node whose parent is gone
    fn tree_with_orphan() -> Tree {
        let mut tree = two_level_tree("root", 1);
        let mut stray = Node::root("stray");
        stray.parent_id = Some(NodeId::from_raw("gone"));
        tree.nodes.push(stray);
        tree
    }

    fn invoke(argv: &[&str]) -> Outcome {
        let matches = cli().try_get_matches_from(argv.iter().copied()).unwrap();
        run(&matches, &PtreeConfig::default()).unwrap().unwrap()
    }

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn reparent_flag_overrides_config() {
        let matches = cli()
            .try_get_matches_from(["ptree", "check", "--input", "t.json", "--reparent"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(orphan_policy(args, &PtreeConfig::default()), OrphanPolicy::Reparent);
    }

    #[test]
    fn check_flags_orphans_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tree(dir.path(), &tree_with_orphan());

        let outcome = invoke(&["ptree", "check", "--input", path.to_str().unwrap()]);
        assert!(!outcome.ok);
        let report = &outcome.report;
        for key in ["nodes", "reachable", "valid", "violation", "orphans", "reparented"] {
            assert!(report.get(key).is_some(), "missing {key}");
        }
        assert_eq!(report["nodes"], 4);
        assert_eq!(report["reachable"], 3);
        assert_eq!(report["valid"], false);
        assert!(report["violation"].is_string());
        assert_eq!(report["orphans"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn check_passes_a_clean_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tree(dir.path(), &two_level_tree("root", 2));

        let outcome = invoke(&["ptree", "check", "-i", path.to_str().unwrap()]);
        assert!(outcome.ok);
        assert_eq!(outcome.report["nodes"], 7);
        assert_eq!(outcome.report["reachable"], 7);
        assert_eq!(outcome.report["valid"], true);
        assert!(outcome.report["violation"].is_null());
        assert!(outcome.report["orphans"].as_array().unwrap().is_empty());
    }

    #[test]
    fn layout_places_reparented_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tree(dir.path(), &tree_with_orphan());

        let dropped = invoke(&["ptree", "layout", "--input", path.to_str().unwrap()]);
        assert!(dropped.ok);
        assert_eq!(dropped.report["depth"], 3);
        assert_eq!(dropped.report["placements"].as_array().unwrap().len(), 3);
        assert_eq!(dropped.report["orphans"].as_array().unwrap().len(), 1);

        let kept = invoke(&["ptree", "layout", "--input", path.to_str().unwrap(), "--reparent"]);
        assert_eq!(kept.report["placements"].as_array().unwrap().len(), 4);
        assert!(kept.report["orphans"].as_array().unwrap().is_empty());
        assert_eq!(kept.report["depth"], 3);
    }

    #[test]
    fn parse_succeeds_only_with_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xml");
        std::fs::write(&good, improvement_response(2)).unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "nothing structured here").unwrap();

        let outcome = invoke(&["ptree", "parse", "--input", good.to_str().unwrap()]);
        assert!(outcome.ok);
        assert_eq!(outcome.report["candidates"].as_array().unwrap().len(), 2);

        let outcome = invoke(&["ptree", "parse", "--input", empty.to_str().unwrap()]);
        assert!(!outcome.ok);
        assert!(outcome.report["candidates"].as_array().unwrap().is_empty());
    }

    #[test]
    fn unreadable_tree_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, "[]").unwrap();
        let matches = cli()
            .try_get_matches_from(["ptree", "check", "--input", path.to_str().unwrap()])
            .unwrap();
        assert!(run(&matches, &PtreeConfig::default()).is_err());
    }
}
