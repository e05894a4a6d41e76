//! `prefab-tool`: diff, patch and inspect prefab DOM files.
//!
//! ```text
//! prefab-tool diff before.prefab after.prefab > change.json
//! prefab-tool apply before.prefab change.json
//! prefab-tool --format ron inspect props/crate.prefab
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use redlilium_dom::{Dom, Format, FormatError, PatchError, apply, decode, decode_patch, diff, encode, encode_patch};
use redlilium_prefab::{TemplateError, template_dom};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum FormatArg {
    #[default]
    Json,
    Ron,
}

impl FormatArg {
    fn format(self) -> Format {
        match self {
            FormatArg::Json => Format::Json,
            FormatArg::Ron => Format::Ron,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "prefab-tool", about = "Diff, patch and inspect RedLilium prefab files")]
struct Args {
    /// Output format, and input format for files without a known extension.
    #[arg(long, default_value = "json", value_enum, global = true)]
    format: FormatArg,

    /// Write compact output instead of pretty-printing.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the patch that turns BEFORE into AFTER.
    Diff { before: PathBuf, after: PathBuf },
    /// Apply PATCH to DOM and print the result.
    Apply { dom: PathBuf, patch: PathBuf },
    /// List the entity and nested instance aliases of a template.
    Inspect { template: PathBuf },
}

#[derive(Debug, thiserror::Error)]
enum ToolError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Format {
        path: String,
        #[source]
        source: FormatError,
    },
    #[error(transparent)]
    Encode(#[from] FormatError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

fn read_text(path: &Path) -> Result<String, ToolError> {
    std::fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn input_format(path: &Path, fallback: Format) -> Format {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Format::from_extension)
        .unwrap_or(fallback)
}

fn read_dom(path: &Path, fallback: Format) -> Result<Dom, ToolError> {
    let text = read_text(path)?;
    decode(&text, input_format(path, fallback)).map_err(|source| ToolError::Format {
        path: path.display().to_string(),
        source,
    })
}

fn inspect(dom: &Dom, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if let Some(entities) = template_dom::entities(dom) {
        for (alias, entity) in entities {
            let name = entity.get("Name").and_then(Dom::as_str).unwrap_or_default();
            let components = entity
                .get("Components")
                .and_then(Dom::as_object)
                .map(|c| c.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            out.push_str(&format!("{indent}entity {alias} '{name}' [{components}]\n"));
        }
    }
    if let Some(instances) = template_dom::instances(dom) {
        for (alias, member) in instances {
            let source = template_dom::source(member).unwrap_or("?");
            if template_dom::is_link_form(member) {
                let overrides = template_dom::link_form_patches(member).map(|p| p.len()).unwrap_or(0);
                out.push_str(&format!("{indent}instance {alias} -> {source} ({overrides} overrides)\n"));
            } else {
                out.push_str(&format!("{indent}instance {alias} -> {source}\n"));
                inspect(member, depth + 1, out);
            }
        }
    }
}

fn run(args: Args) -> Result<String, ToolError> {
    let format = args.format.format();
    let pretty = !args.compact;
    match args.command {
        Command::Diff { before, after } => {
            let before = read_dom(&before, format)?;
            let after = read_dom(&after, format)?;
            let patch = diff(&before, &after);
            log::info!("{} operations", patch.len());
            Ok(encode_patch(&patch, format, pretty)?)
        }
        Command::Apply { dom, patch } => {
            let target = read_dom(&dom, format)?;
            let patch_text = read_text(&patch)?;
            let patch = decode_patch(&patch_text, input_format(&patch, format)).map_err(|source| ToolError::Format {
                path: patch.display().to_string(),
                source,
            })?;
            let patched = apply(&target, &patch)?;
            Ok(encode(&patched, format, pretty)?)
        }
        Command::Inspect { template } => {
            let dom = read_dom(&template, format)?;
            template_dom::validate_template_dom(&dom)?;
            let mut out = format!(
                "template {}\n",
                template_dom::source(&dom).unwrap_or(&template.display().to_string())
            );
            inspect(&dom, 1, &mut out);
            Ok(out)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run(Args::parse()) {
        Ok(output) => {
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Dom {
        decode(text, Format::Json).unwrap()
    }

    #[test]
    fn inspect_lists_aliases() {
        let dom = parse(
            r#"{"Source": "a",
                "Entities": {"E": {"Id": "E", "Name": "Door", "Components": {"Health": {}}}},
                "Instances": {
                    "L": {"Source": "b", "Patches": [{"op": "remove", "path": "/Entities/X"}]},
                    "X": {"Source": "c", "Entities": {"F": {"Id": "F", "Name": "Frame"}}}
                }}"#,
        );
        let mut out = String::new();
        inspect(&dom, 0, &mut out);
        assert_eq!(
            out,
            "entity E 'Door' [Health]\n\
             instance L -> b (1 overrides)\n\
             instance X -> c\n  entity F 'Frame' []\n"
        );
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["prefab-tool", "--format", "ron", "diff", "a", "b"]).unwrap();
        assert_eq!(args.format, FormatArg::Ron);
        assert!(matches!(args.command, Command::Diff { .. }));
        assert!(Args::try_parse_from(["prefab-tool", "apply", "only-one"]).is_err());
    }
}
