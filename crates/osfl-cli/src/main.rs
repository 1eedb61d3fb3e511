//! The `osfl` command line: parse arguments, run one source file, report
//! the first failure in the standard diagnostic format.

use std::{env, process::ExitCode};

use osfl::{Config, Session};

fn print_usage(program_name: &str) {
    eprintln!("Usage: {program_name} [options] <input_file>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help           Display this help message");
    eprintln!("  -v, --version        Display version information");
    eprintln!("  -o <file>            Specify output file");
    eprintln!("  -d, --debug          Enable debug output");
    eprintln!("  --no-optimize        Disable optimizations");
}

/// What one invocation should do.
#[derive(Debug, PartialEq)]
enum CliAction {
    Help,
    Version,
    Run(Config),
}

/// Parses `args` (without the program name). `Err` carries a message for
/// stderr; the caller prints usage after it.
fn parse_args(args: &[String]) -> Result<CliAction, String> {
    if args.is_empty() {
        return Err("No input file specified".to_owned());
    }

    let mut config = Config::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-v" | "--version" => return Ok(CliAction::Version),
            "-o" => match iter.next() {
                Some(path) => config.output_file = Some(path.clone()),
                None => return Err("Option '-o' requires a file argument".to_owned()),
            },
            "-d" | "--debug" => config.debug_mode = true,
            "--no-optimize" => config.optimize = false,
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {other}"));
            }
            other => {
                if config.input_file.is_some() {
                    return Err("Multiple input files not supported".to_owned());
                }
                config.input_file = Some(other.to_owned());
            }
        }
    }

    if config.input_file.is_none() {
        return Err("No input file specified".to_owned());
    }
    Ok(CliAction::Run(config))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map_or("osfl", String::as_str);

    let action = match parse_args(&args[1..]) {
        Ok(action) => action,
        Err(message) => {
            eprintln!("{message}");
            print_usage(program_name);
            return ExitCode::FAILURE;
        }
    };

    let config = match action {
        CliAction::Help => {
            print_usage(program_name);
            return ExitCode::SUCCESS;
        }
        CliAction::Version => {
            eprintln!("OSFL Version {}", osfl::VERSION);
            return ExitCode::SUCCESS;
        }
        CliAction::Run(config) => config,
    };

    let input_file = config.input_file.clone().unwrap_or_default();
    let debug_mode = config.debug_mode;
    let session = Session::new(config);
    match session.run_file(&input_file) {
        Ok(vm) => {
            if debug_mode {
                eprint!("{}", vm.dump_registers());
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse_args(&args(&["-h"])), Ok(CliAction::Help));
        assert_eq!(parse_args(&args(&["--version"])), Ok(CliAction::Version));
    }

    #[test]
    fn options_fill_the_config() {
        let action = parse_args(&args(&["-d", "-o", "out.bin", "--no-optimize", "prog.osfl"])).unwrap();
        let CliAction::Run(config) = action else {
            panic!("expected run action");
        };
        assert!(config.debug_mode);
        assert!(!config.optimize);
        assert_eq!(config.output_file.as_deref(), Some("out.bin"));
        assert_eq!(config.input_file.as_deref(), Some("prog.osfl"));
    }

    #[test]
    fn rejects_unknown_options_and_extra_inputs() {
        assert!(parse_args(&args(&["--wat", "a.osfl"])).is_err());
        assert!(parse_args(&args(&["a.osfl", "b.osfl"])).is_err());
        assert!(parse_args(&args(&["-o"])).is_err());
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["-d"])).is_err());
    }
}
