//! Merge PDF files
//!
//! Usage:
//!   pdf_merge [options] <input1.pdf[:pages]> [input2.pdf[:pages] ...] <output.pdf>
//!
//! Pages are 0-based and comma separated, e.g. `report.pdf:0,2`. Without a
//! page list every page of that input is taken.
//!
//! Set `RUST_LOG=debug` for parser and merge diagnostics.

use pdf_merge::{
    load_document_with_options, merge_documents_with_options, write_document, Document, Error, MergeOptions,
    MergeSource, PageSelector, ParserOptions,
};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "\
Usage: pdf_merge [options] <input1.pdf[:pages]> [input2.pdf[:pages] ...] <output.pdf>

Pages are 0-based and comma separated, e.g. report.pdf:0,2

Options:
  --strict          Fail on malformed input instead of repairing it
  --keep-info       Copy the first input's document information
  --warnings-json   Print recovered problems as JSON on stdout
  -h, --help        Show this message";

struct InputSpec {
    path: PathBuf,
    pages: PageSelector,
}

struct MergeConfig {
    inputs: Vec<InputSpec>,
    output: PathBuf,
    strict: bool,
    keep_info: bool,
    warnings_json: bool,
}

impl MergeConfig {
    /// `Ok(None)` when help was requested.
    fn from_args(args: &[String]) -> Result<Option<Self>, String> {
        let mut paths = Vec::new();
        let mut strict = false;
        let mut keep_info = false;
        let mut warnings_json = false;

        for arg in args {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--strict" => strict = true,
                "--keep-info" => keep_info = true,
                "--warnings-json" => warnings_json = true,
                flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
                path => paths.push(path.to_string()),
            }
        }

        let output = match paths.pop() {
            Some(output) if !paths.is_empty() => PathBuf::from(output),
            _ => return Err("need at least one input and an output file".to_string()),
        };
        let inputs = paths.iter().map(|p| parse_input(p)).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            inputs,
            output,
            strict,
            keep_info,
            warnings_json,
        }))
    }
}

/// Split `file.pdf:0,2` into a path and a page selector.
///
/// The suffix is only taken as a page list when it consists of digits and
/// commas, so paths containing `:` still work.
fn parse_input(arg: &str) -> Result<InputSpec, String> {
    if let Some((path, list)) = arg.rsplit_once(':') {
        let is_page_list = !list.is_empty() && list.bytes().all(|b| b.is_ascii_digit() || b == b',');
        if is_page_list && !path.is_empty() {
            let indices = list
                .split(',')
                .map(|n| n.parse::<usize>().map_err(|_| format!("bad page list '{}' for {}", list, path)))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(InputSpec {
                path: PathBuf::from(path),
                pages: PageSelector::Indices(indices),
            });
        }
    }
    Ok(InputSpec {
        path: PathBuf::from(arg),
        pages: PageSelector::All,
    })
}

fn describe(err: &Error) -> String {
    match err {
        Error::PasswordRequired => {
            "document is password protected; only files that open without a password can be merged".to_string()
        },
        Error::UnsupportedEncryption(detail) => format!(
            "document uses an unsupported encryption scheme ({}); decrypt it with another tool first",
            detail
        ),
        other => other.to_string(),
    }
}

fn run(config: MergeConfig) -> Result<(), String> {
    let options = if config.strict {
        ParserOptions::strict()
    } else {
        ParserOptions::lenient()
    };

    let mut buffers = Vec::with_capacity(config.inputs.len());
    for input in &config.inputs {
        let bytes = fs::read(&input.path).map_err(|e| format!("{}: {}", input.path.display(), e))?;
        buffers.push(bytes);
    }

    let loaded: Vec<Result<Document, Error>> = buffers
        .into_par_iter()
        .map(|bytes| load_document_with_options(bytes, &options))
        .collect();

    let mut sources = Vec::with_capacity(loaded.len());
    for (input, result) in config.inputs.into_iter().zip(loaded) {
        let document = result.map_err(|e| format!("{}: {}", input.path.display(), describe(&e)))?;
        sources.push(MergeSource {
            document,
            pages: input.pages,
        });
    }

    let merge_options = MergeOptions::default().with_info(config.keep_info);
    let mut merged = merge_documents_with_options(sources, &merge_options).map_err(|e| describe(&e))?;
    let bytes = write_document(&mut merged).map_err(|e| describe(&e))?;

    fs::write(&config.output, &bytes).map_err(|e| format!("{}: {}", config.output.display(), e))?;

    if config.warnings_json {
        let json = serde_json::to_string_pretty(merged.warnings()).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else {
        for warning in merged.warnings() {
            eprintln!("warning: {}", warning);
        }
    }
    log::info!(
        "Wrote {} ({} bytes, {} warnings)",
        config.output.display(),
        bytes.len(),
        merged.warnings().len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match MergeConfig::from_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        },
        Err(msg) => {
            eprintln!("Error: {}\n\n{}", msg, USAGE);
            return ExitCode::from(2);
        },
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_input_page_list() {
        let spec = parse_input("a.pdf:0,2").unwrap();
        assert_eq!(spec.path, PathBuf::from("a.pdf"));
        assert_eq!(spec.pages, PageSelector::Indices(vec![0, 2]));
    }

    #[test]
    fn test_parse_input_plain_and_colon_paths() {
        assert_eq!(parse_input("a.pdf").unwrap().pages, PageSelector::All);
        let spec = parse_input("C:\\docs\\a.pdf").unwrap();
        assert_eq!(spec.path, PathBuf::from("C:\\docs\\a.pdf"));
        assert_eq!(spec.pages, PageSelector::All);
        assert!(parse_input("a.pdf:1,,2").is_err());
    }

    #[test]
    fn test_config_from_args() {
        let config = MergeConfig::from_args(&args(&["--warnings-json", "a.pdf", "b.pdf:1", "out.pdf"]))
            .unwrap()
            .unwrap();
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.output, PathBuf::from("out.pdf"));
        assert!(config.warnings_json);
        assert!(!config.strict);
    }

    #[test]
    fn test_config_errors_and_help() {
        assert!(MergeConfig::from_args(&args(&["out.pdf"])).is_err());
        assert!(MergeConfig::from_args(&args(&["--bogus", "a.pdf", "out.pdf"])).is_err());
        assert!(MergeConfig::from_args(&args(&["a.pdf", "-h"])).unwrap().is_none());
    }
}
