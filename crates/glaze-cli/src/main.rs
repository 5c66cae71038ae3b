use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use glaze_front::{parse_shader_strings, Messages, Options, Profile, Stage};

/// Glaze — GLSL front-end checker
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input shader file
    input: PathBuf,

    /// Shader stage (default: inferred from the file extension)
    #[arg(short, long, value_parser = parse_stage)]
    stage: Option<Stage>,

    /// GLSL version to compile against (overridden by #version)
    #[arg(long, default_value = "110")]
    glsl_version: u32,

    /// Profile: none, core, compatibility, or es
    #[arg(short, long, default_value = "none", value_parser = parse_profile)]
    profile: Profile,

    /// Dump the HIR after a successful compile
    #[arg(long)]
    emit_hir: bool,

    /// Suppress warnings
    #[arg(short = 'w', long)]
    no_warnings: bool,

    /// Treat the info log as the only output, even on success
    #[arg(short, long)]
    quiet: bool,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_profile(s: &str) -> Result<Profile, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// Stage from the conventional file extensions.
fn stage_from_extension(path: &std::path::Path) -> Option<Stage> {
    match path.extension()?.to_str()? {
        "vert" | "vs" => Some(Stage::Vertex),
        "frag" | "fs" => Some(Stage::Fragment),
        "geom" => Some(Stage::Geometry),
        "tesc" => Some(Stage::TessControl),
        "tese" => Some(Stage::TessEvaluation),
        "comp" => Some(Stage::Compute),
        _ => None,
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<bool> {
    env_logger::try_init().ok();

    let cli = Cli::parse();

    let stage = match cli.stage.or_else(|| stage_from_extension(&cli.input)) {
        Some(stage) => stage,
        None => {
            return Err(miette::miette!(
                "cannot infer stage from '{}'; pass --stage",
                cli.input.display()
            ));
        }
    };

    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    let mut options = Options::new(cli.glsl_version, cli.profile, stage);
    if cli.no_warnings {
        options.messages = options.messages | Messages::SUPPRESS_WARNINGS;
    }

    let result = parse_shader_strings(&[&source], &options);

    if !result.log.is_empty() {
        eprint!("{}", result.log);
    }
    if result.success && !cli.quiet {
        log::info!(
            "compiled {} as {} {} (version {})",
            cli.input.display(),
            result.profile.as_str(),
            stage.as_str(),
            result.version
        );
    }
    if result.success && cli.emit_hir {
        print!("{}", glaze_hir::dump_unit(&result.unit));
    }

    Ok(result.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    // ---- Argument parsing ----

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["glaze", "shader.vert"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("shader.vert"));
        assert!(cli.stage.is_none());
        assert_eq!(cli.glsl_version, 110);
        assert_eq!(cli.profile, Profile::None);
        assert!(!cli.emit_hir);
        assert!(!cli.no_warnings);
    }

    #[test]
    fn cli_all_flags() {
        let cli = Cli::try_parse_from([
            "glaze",
            "shader.glsl",
            "--stage",
            "fragment",
            "--glsl-version",
            "330",
            "--profile",
            "core",
            "--emit-hir",
            "-w",
        ])
        .unwrap();
        assert_eq!(cli.stage, Some(Stage::Fragment));
        assert_eq!(cli.glsl_version, 330);
        assert_eq!(cli.profile, Profile::Core);
        assert!(cli.emit_hir);
        assert!(cli.no_warnings);
    }

    #[test]
    fn cli_invalid_stage() {
        let result = Cli::try_parse_from(["glaze", "a.vert", "--stage", "raygen"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_invalid_profile() {
        let result = Cli::try_parse_from(["glaze", "a.vert", "--profile", "banana"]);
        assert!(result.is_err());
    }

    // ---- Stage inference ----

    #[test]
    fn stage_inference_from_extension() {
        assert_eq!(
            stage_from_extension(std::path::Path::new("a.vert")),
            Some(Stage::Vertex)
        );
        assert_eq!(
            stage_from_extension(std::path::Path::new("a.frag")),
            Some(Stage::Fragment)
        );
        assert_eq!(
            stage_from_extension(std::path::Path::new("a.comp")),
            Some(Stage::Compute)
        );
        assert_eq!(stage_from_extension(std::path::Path::new("a.glsl")), None);
        assert_eq!(stage_from_extension(std::path::Path::new("noext")), None);
    }
}
