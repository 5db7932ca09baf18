//! End-to-end pipeline: recorded transcript -> scan -> snapshot file ->
//! restore -> HTML report.

use std::collections::BTreeMap;

use wsexplorer::member::MemberKind;
use wsexplorer::render::html::render_html_report;
use wsexplorer::report::build_report_data;
use wsexplorer::scan::{ScanStrategy, read_workspace};
use wsexplorer::session::{
    ReplaySession, summary_command, type_flag_summary_command, value_query_command,
    verbose_print_command,
};
use wsexplorer::snapshot::WorkspaceSnapshot;
use wsexplorer::workspace::ResolutionMode;

fn dump(address: &str, clients: &[(&str, &str, &str)], servers: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("--- RooAbsArg ---\n  Value State: DIRTY\n");
    out.push_str(&format!("  Address: {}\n", address));
    out.push_str("  Clients: \n");
    for (addr, class, name) in clients {
        out.push_str(&format!("    ({},V-) {}::{} \"\"\n", addr, class, name));
    }
    out.push_str("  Servers: \n");
    for (addr, class, name) in servers {
        out.push_str(&format!("    ({},V-) {}::{} \"\"\n", addr, class, name));
    }
    out
}

/// A small but complete model: two observables, a formula-derived mean, a
/// Gaussian p.d.f. using a constant width, and one dataset.
fn member_dumps() -> Vec<(&'static str, String)> {
    let mhyp = ("0x1", "RooRealVar", "mhyp");
    let mrec = ("0x2", "RooRealVar", "mrec");
    let mean = ("0x3", "RooFormulaVar", "mean");
    let gauss = ("0x4", "RooGaussian", "gaussian");
    let width = ("0x6", "RooConstVar", "width");

    let mut mean_dump = dump("0x3", &[gauss], &[mhyp]);
    mean_dump.push_str(
        "  Proxies: \n    actualVars -> \n      1)  mhyp\n\
         --- RooFormula ---\n  Formula: \"@0 - 5 * (@0/200)**2\"\n",
    );

    vec![
        ("mhyp", dump("0x1", &[mean], &[])),
        ("mrec", dump("0x2", &[gauss], &[])),
        ("mean", mean_dump),
        (
            "gaussian",
            dump(
                "0x4",
                &[],
                &[
                    ("0x2", "RooRealVar", "mrec"),
                    ("0x3", "RooFormulaVar", "mean"),
                    ("0x6", "RooConstVar", "width"),
                ],
            ),
        ),
        ("data", "--- RooAbsArg ---\n  Address: 0x5\n".to_string()),
        ("width", dump("0x6", &[gauss], &[])),
    ]
}

fn headings_transcript() -> BTreeMap<String, String> {
    let summary = "\
RooWorkspace(wspace) mass model contents\n\
\n\
variables\n\
---------\n\
(mhyp,mrec)\n\
\n\
p.d.f.s\n\
-------\n\
RooGaussian::gaussian[ x=mrec mean=mean sigma=width ] = 0.5\n\
\n\
functions\n\
--------\n\
RooFormulaVar::mean[ actualVars=(mhyp) formula=\"@0 - 5 * (@0/200)**2\" ] = 124.9\n\
\n\
datasets\n\
--------\n\
RooDataSet::data(mrec)\n";

    let mut outputs = BTreeMap::new();
    outputs.insert(summary_command("wspace"), summary.to_string());
    for (name, text) in member_dumps() {
        outputs.insert(verbose_print_command("wspace", name), text);
    }
    outputs
}

fn type_flag_transcript() -> BTreeMap<String, String> {
    let listing = "\
RooRealVar,0,0,1,0,1,0,mhyp\n\
RooRealVar,0,0,1,0,1,0,mrec\n\
RooFormulaVar,0,0,0,0,1,0,mean\n\
RooGaussian,1,0,0,0,1,0,gaussian\n\
RooDataSet,0,0,0,1,0,0,data\n\
RooConstVar,0,1,0,0,1,0,width\n";

    let mut outputs = BTreeMap::new();
    outputs.insert(type_flag_summary_command("wspace"), listing.to_string());
    for (name, text) in member_dumps() {
        outputs.insert(verbose_print_command("wspace", name), text);
    }
    outputs.insert(value_query_command("wspace", "mhyp"), "125,0\n".to_string());
    outputs.insert(value_query_command("wspace", "mrec"), "124.3,0\n".to_string());
    outputs
}

fn check_workspace(ws: &wsexplorer::workspace::Workspace) {
    assert_eq!(ws.len(), 6);

    let gauss = ws.find_by_name("gaussian").unwrap();
    assert_eq!(ws.servers_of(gauss).unwrap().len(), 3);
    // mrec, mean, width directly plus mhyp through mean
    assert_eq!(ws.overall_num_servers(gauss).unwrap(), 4);

    let mhyp = ws.find_by_name("mhyp").unwrap();
    assert_eq!(ws.overall_num_clients(mhyp).unwrap(), 2);

    match &ws.member(ws.find_by_name("mean").unwrap()).kind {
        MemberKind::FormulaVar(formula) => {
            assert_eq!(formula.expand().unwrap(), "mhyp - 5 * (mhyp/200)**2");
        }
        other => panic!("unexpected kind {:?}", other),
    }
}

fn run_pipeline(outputs: BTreeMap<String, String>, mode: ResolutionMode, strategy: ScanStrategy) {
    let mut session = ReplaySession::new(outputs);
    let ws = read_workspace(&mut session, "transcript", "wspace", mode, strategy).unwrap();
    check_workspace(&ws);

    // snapshot file round trip
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    WorkspaceSnapshot::capture(&ws).unwrap().save_to_file(&path).unwrap();
    let restored = WorkspaceSnapshot::load_from_file(&path).unwrap().restore().unwrap();
    check_workspace(&restored);

    // full report
    let data = build_report_data(&restored, None).unwrap();
    assert_eq!(data.graph.nodes.len(), 6);
    let html = render_html_report(&data).unwrap();
    assert!(html.contains("\"gaussian\""));

    // report rooted at the p.d.f. excludes the dataset
    let data = build_report_data(&restored, Some("gaussian")).unwrap();
    assert_eq!(data.graph.nodes.len(), 5);
    assert!(data.graph.nodes.iter().all(|n| n.name != "data"));
}

#[test]
fn headings_pipeline() {
    run_pipeline(
        headings_transcript(),
        ResolutionMode::ByName,
        ScanStrategy::Headings,
    );
}

#[test]
fn type_flag_pipeline() {
    run_pipeline(
        type_flag_transcript(),
        ResolutionMode::ByAddress,
        ScanStrategy::TypeFlags,
    );
}
