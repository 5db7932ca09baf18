use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wsexplorer::Result;
use wsexplorer::render::html::render_html_report;
use wsexplorer::report::build_report_data;
use wsexplorer::scan::{MemberParseError, ScanStrategy, read_workspace};
use wsexplorer::session::ReplaySession;
use wsexplorer::snapshot::WorkspaceSnapshot;
use wsexplorer::workspace::ResolutionMode;

#[derive(Parser)]
#[command(name = "wsexplorer")]
#[command(about = "Workspace model explorer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a workspace from a recorded session transcript and save it as
    /// a snapshot file.
    Scan {
        /// JSON transcript mapping engine commands to their outputs.
        #[arg(long)]
        transcript: String,

        /// Locator recorded as the workspace origin (defaults to the
        /// transcript path).
        #[arg(long)]
        source: Option<String>,

        /// Name of the workspace variable inside the engine session.
        #[arg(long)]
        name: String,

        #[arg(long, value_enum, default_value = "headings")]
        strategy: ScanStrategy,

        /// Resolve cross-references by address instead of by name.
        #[arg(long)]
        by_address: bool,

        #[arg(short = 'o', long)]
        out: String,
    },

    /// Generate an HTML report from a snapshot file.
    Report {
        #[arg(long)]
        snapshot: String,

        /// Restrict the graph to one member and its dependencies.
        #[arg(long)]
        root: Option<String>,

        #[arg(short = 'o', long)]
        out: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Scan {
            transcript,
            source,
            name,
            strategy,
            by_address,
            out,
        } => {
            let mode = if by_address {
                ResolutionMode::ByAddress
            } else {
                ResolutionMode::ByName
            };
            let source = source.unwrap_or_else(|| transcript.clone());

            let mut session = ReplaySession::from_file(&transcript)?;
            let ws = match read_workspace(&mut session, &source, &name, mode, strategy) {
                Ok(ws) => ws,
                Err(err) => {
                    // a member dump that would not parse is worth showing whole
                    if let Some(parse_err) = err.downcast_ref::<MemberParseError>() {
                        eprintln!("{}", parse_err.verbose_message());
                    }
                    return Err(err);
                }
            };

            WorkspaceSnapshot::capture(&ws)?.save_to_file(std::path::Path::new(&out))?;
            println!("Wrote {}", out);
        }

        Commands::Report { snapshot, root, out } => {
            let snapshot = WorkspaceSnapshot::load_from_file(std::path::Path::new(&snapshot))?;
            let ws = snapshot.restore()?;

            let data = build_report_data(&ws, root.as_deref())?;
            let html = render_html_report(&data)?;
            std::fs::write(&out, html)?;
            println!("Wrote {}", out);
        }
    }

    Ok(())
}
