//! Stencil CLI: compile a structural-tag JSON document and print the
//! resulting grammar.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stencil_compiler::structural_tag_to_grammar;
use stencil_core::recursion::set_max_recursion_depth;

#[derive(Parser)]
#[command(name = "stencil", about = "Structural tag → grammar compiler")]
struct Cli {
    /// Path to the structural-tag JSON document; reads stdin when omitted
    input: Option<PathBuf>,

    /// Recursion depth limit for parsing and analysis
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Some(depth) = cli.max_depth {
        set_max_recursion_depth(depth);
    }

    let input = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let grammar = structural_tag_to_grammar(&input)?;
    info!(rules = grammar.num_rules(), "compilation finished");
    print!("{grammar}");
    Ok(())
}
