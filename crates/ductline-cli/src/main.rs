//! ductline command-line front end

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ductline_core::stream::{
    Assembly, AssemblySpec, Duct, DuctHooks, HookError, PipelineDriver, StreamGraph,
};
use ductline_core::StreamGraphConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ductline - compile a logical assembly into an executable stream graph
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assembly description (JSON)
    assembly: PathBuf,

    /// Print the bound graph in DOT format instead of the route table
    #[arg(long)]
    dot: bool,

    /// Also write the bound graph in DOT format to this file
    #[arg(long)]
    dot_file: Option<PathBuf>,

    /// Where to dump the graph if compilation fails
    /// (defaults to $DUCTLINE_ERROR_DOT_FILE)
    #[arg(long)]
    error_dot_file: Option<PathBuf>,

    /// Drive prepare, start and cleanup after binding
    #[arg(long)]
    run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Hooks that log every lifecycle call.
#[derive(Debug, Default)]
struct LoggingHooks {
    calls: usize,
}

impl LoggingHooks {
    fn log(&mut self, phase: &str, duct: &Duct) {
        self.calls += 1;
        info!(%duct, capabilities = %duct.capabilities(), "{phase}");
    }
}

impl DuctHooks for LoggingHooks {
    fn initialize(&mut self, duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        self.log("initialize", duct);
        Ok(())
    }

    fn prepare(&mut self, duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        self.log("prepare", duct);
        Ok(())
    }

    fn cleanup(&mut self, duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        self.log("cleanup", duct);
        Ok(())
    }
}

fn load_assembly(path: &Path) -> Result<Assembly> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading assembly {}", path.display()))?;
    let spec = AssemblySpec::from_json(&json)
        .with_context(|| format!("parsing assembly {}", path.display()))?;
    let assembly = spec.build().context("validating assembly")?;
    Ok(assembly)
}

fn graph_config(args: &Args) -> StreamGraphConfig {
    match &args.error_dot_file {
        Some(path) => StreamGraphConfig::default().with_error_dot_file(path),
        None => StreamGraphConfig::from_env(),
    }
}

/// One line per bound stage: `name -> next`.
fn route_table(driver: &PipelineDriver<'_, LoggingHooks>) -> Result<String> {
    let graph = driver.graph();
    let mut out = String::new();
    for (duct, next) in driver.bound_routes()? {
        let label = |id| {
            graph
                .duct(id)
                .map_or_else(|| id.to_string(), Duct::label)
        };
        out.push_str(&format!("{} -> {}\n", label(duct), label(next)));
    }
    Ok(out)
}

fn run(args: &Args) -> Result<String> {
    let assembly = load_assembly(&args.assembly)?;
    info!(
        steps = assembly.step_count(),
        edges = assembly.edge_count(),
        "loaded assembly"
    );

    let mut graph = assembly.instantiate(graph_config(args))?;
    let mut driver = PipelineDriver::new(&mut graph, LoggingHooks::default());
    driver.bind()?;

    let output = if args.dot {
        driver.graph().to_dot()
    } else {
        route_table(&driver)?
    };

    if let Some(path) = &args.dot_file {
        driver
            .graph()
            .print_graph(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if args.run {
        driver.prepare()?;
        let heads = driver.start()?;
        info!(heads = heads.len(), "pipeline started");
        driver.cleanup()?;
        info!(hook_calls = driver.hooks().calls, "pipeline finished");
    }

    Ok(output)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ductline={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Assembly: {}", args.assembly.display());

    let output = run(&args)?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUPED: &str = r#"{
        "steps": [
            { "name": "lines", "source": true },
            { "name": "by_word", "capabilities": ["gate"] },
            { "name": "count", "capabilities": ["reducing"] },
            { "name": "out", "capabilities": ["sink"] }
        ],
        "edges": [["lines", "by_word"], ["by_word", "count"], ["count", "out"]]
    }"#;

    fn args_for(path: &Path) -> Args {
        Args::parse_from(["ductline", path.to_str().unwrap()])
    }

    fn write_assembly(dir: &tempfile::TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("assembly.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_route_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_assembly(&dir, GROUPED);
        let output = run(&args_for(&path)).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "lines -> by_word");
        assert!(lines[1].starts_with("by_word -> OpenReducingWindow("));
        assert!(lines[2].starts_with("count -> CloseWindow("));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_dot_output_and_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_assembly(&dir, GROUPED);
        let dot_file = dir.path().join("bound.dot");
        let mut args = args_for(&path);
        args.dot = true;
        args.run = true;
        args.dot_file = Some(dot_file.clone());

        let output = run(&args).unwrap();
        assert!(output.starts_with("digraph StreamGraph {"));
        assert_eq!(std::fs::read_to_string(dot_file).unwrap(), output);
    }

    #[test]
    fn test_invalid_assembly_reports_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_assembly(&dir, r#"{ "steps": [{ "name": "lonely" }] }"#);
        let err = run(&args_for(&path)).unwrap_err();
        assert_eq!(err.to_string(), "validating assembly");
    }

    #[test]
    fn test_missing_file() {
        let err = run(&args_for(Path::new("/nonexistent/assembly.json"))).unwrap_err();
        assert!(err.to_string().starts_with("reading assembly"));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
