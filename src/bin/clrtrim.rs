//! Command-line front end for the trim engine: reads an assembly and an
//! invocation-statistics JSON document, trims, and writes the result next
//! to the input using the `.s0`/`.s0.d`/`.s1`/`.s1.d` naming convention.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use clrtrim::stats::load_invoked_methods;
use clrtrim::trim::{trim_class_level, trim_method_level};

#[derive(Parser)]
#[command(name = "clrtrim")]
#[command(about = "Trim unreachable CLI metadata and method bodies from a .NET assembly", version)]
struct Args {
    /// Path to the input assembly (a PE image with a CLI header).
    input: PathBuf,

    /// Invocation-statistics JSON document.
    #[arg(long)]
    stats: PathBuf,

    /// Assembly name to filter the statistics document to.
    #[arg(long)]
    assembly: String,

    /// Trim whole unreachable types only, leaving every method of a
    /// preserved type intact. The default is method-granularity trimming.
    #[arg(long)]
    class: bool,

    /// Also run the reference closure over MemberRef/TypeSpec/MethodSpec
    /// and the `#Blob`/`#US` heaps.
    #[arg(long)]
    deep: bool,

    /// Output path. Defaults to the input path with the conventional
    /// `.s0`/`.s0.d`/`.s1`/`.s1.d` suffix.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let image = fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let stats_json = fs::read_to_string(&args.stats).with_context(|| format!("reading {}", args.stats.display()))?;
    let invoked_methods = load_invoked_methods(&stats_json, &args.assembly)?;

    let trimmed = if args.class {
        trim_class_level(&image, &invoked_methods, args.deep)?
    } else {
        trim_method_level(&image, &invoked_methods, args.deep)?
    };

    let output_path = args.output.clone().unwrap_or_else(|| default_output_path(&args.input, args.class, args.deep));
    fs::write(&output_path, &trimmed).with_context(|| format!("writing {}", output_path.display()))?;

    log::info!(
        "trimmed {} ({} invoked methods) -> {}",
        args.input.display(),
        invoked_methods.len(),
        output_path.display(),
    );
    println!("wrote {}", output_path.display());
    Ok(())
}

fn default_output_path(input: &Path, class_level: bool, deep: bool) -> PathBuf {
    let mut suffix = if class_level { ".s0".to_string() } else { ".s1".to_string() };
    if deep {
        suffix.push_str(".d");
    }
    let mut name = input.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_appends_s0_suffix() {
        let path = default_output_path(Path::new("App.dll"), true, false);
        assert_eq!(path, PathBuf::from("App.dll.s0"));
    }

    #[test]
    fn default_output_path_appends_s1_deep_suffix() {
        let path = default_output_path(Path::new("App.dll"), false, true);
        assert_eq!(path, PathBuf::from("App.dll.s1.d"));
    }
}
