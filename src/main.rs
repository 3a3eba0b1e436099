use clap::Parser;

use impact_sph::config::Config;
use impact_sph::error::{Error, Result};
use impact_sph::jobs;
use impact_sph::paths::Path;
use impact_sph::run::NullCallbacks;

#[derive(Parser, Debug)]
#[command(about = "SPH/N-body simulation driver for asteroid collisions")]
struct Args {
    /// Path to the job-graph config file.
    config: String,
}

fn run(config_path: &str) -> Result<()> {
    let mut config = Config::new();
    config.load(&Path::new(config_path))?;
    let (mut graph, root, global) = jobs::graph_from_config(&config)?;
    graph.run(root, &global, &mut NullCallbacks)?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    match run(&args.config) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            let code = match e {
                Error::InvalidSetup(_)
                | Error::ConfigParse { .. }
                | Error::ConfigNotFound(_)
                | Error::UnknownKey(_)
                | Error::InvalidValue { .. } => 1,
                Error::Io(_) => 2,
                _ => 3,
            };
            std::process::exit(code);
        }
    }
}
