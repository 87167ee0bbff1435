use std::error::Error;
use std::process::exit;

use clap::{crate_name, crate_version, App, Arg, ArgMatches, SubCommand};
use log::debug;

use unitexloader::config::{Bitness, LoaderSettings};
use unitexloader::library::EngineLibrary;
use unitexloader::resources::write_settings_json;

// Subcommand names
const PATHS_SUB_CMD: &str = "paths";
const LOAD_SUB_CMD: &str = "load";
const INIT_SUB_CMD: &str = "init";

// Argument names
const DIR_ARG: &str = "dir";
const FPATH_SETTING_ARG: &str = "fpath_setting";
const OUT_FILE_ARG: &str = "out_file";
const QUIET_ARG: &str = "quiet";
const VERBOSE_ARG: &str = "verbose";

const DEFAULT_SETTING_FILE: &str = "unitexloader.json";

fn unwrap<T, E: Error>(t: Result<T, E>) -> T {
  match t {
    Ok(t) => t,
    Err(e) => {
      eprintln!("{}: error: {}", crate_name!(), e);
      exit(1);
    }
  }
}

fn settings(args: &ArgMatches) -> LoaderSettings {
  let settings = match args.value_of(FPATH_SETTING_ARG) {
    Some(path) => unwrap(LoaderSettings::from_file(path)),
    None => LoaderSettings::default(),
  };
  match args.value_of(DIR_ARG) {
    Some(dir) => settings.with_library_dir(dir),
    None => settings,
  }
}

fn paths(args: &ArgMatches) {
  let paths = unwrap(settings(args).paths());
  let current = Bitness::current();
  for (bitness, path) in &[
    (Bitness::Bits64, paths.path_64bit()),
    (Bitness::Bits32, paths.path_32bit()),
  ] {
    let marker = if *bitness == current { "*" } else { " " };
    let exists = if path.is_file() { "" } else { " (missing)" };
    println!("{} {:?}\t{}{}", marker, bitness, path.display(), exists);
  }
}

fn load(args: &ArgMatches) {
  let settings = settings(args);
  let library = unwrap(EngineLibrary::from_settings(&settings));
  if let Some(path) = library.loaded_path() {
    println!("loaded\t{}", path.display());
  }
  match unwrap(library.can_unload_now()) {
    Some(value) => println!("{}\t{}", library.can_unload_symbol(), value),
    None => println!("{}\tnot exported", library.can_unload_symbol()),
  }
  println!("dispose\t{}", library.dispose());
}

fn setting_file_path<'a>(args: &'a ArgMatches) -> &'a str {
  args.value_of(OUT_FILE_ARG).unwrap_or(DEFAULT_SETTING_FILE)
}

fn init(args: &ArgMatches) {
  let path = setting_file_path(args);
  if unwrap(write_settings_json(path)) {
    println!("wrote {}", path);
  } else {
    println!("{} already exists", path);
  }
}

fn init_logger(matches: &ArgMatches) {
  let verbosity = 1 + matches.occurrences_of(VERBOSE_ARG) as usize;
  unwrap(
    stderrlog::new()
      .module(module_path!())
      .quiet(matches.is_present(QUIET_ARG))
      .verbosity(verbosity)
      .init(),
  );
  debug!("log verbosity {}", verbosity);
}

fn init_subcommand<'a, 'b>() -> App<'a, 'b> {
  SubCommand::with_name(INIT_SUB_CMD)
    .about("Write Default Setting File")
    .help_message("see `init -h`")
    .arg(
      Arg::with_name(OUT_FILE_ARG)
        .short("o")
        .takes_value(true)
        .help("output file (default: unitexloader.json)"),
    )
}

fn main() {
  let dir_arg = Arg::with_name(DIR_ARG)
    .short("d")
    .takes_value(true)
    .help("directory holding the 32-bit and 64-bit libraries (default: next to this executable)");
  let setting_arg = Arg::with_name(FPATH_SETTING_ARG)
    .short("r")
    .takes_value(true)
    .help("the setting file in JSON format");

  let paths_subcommand = SubCommand::with_name(PATHS_SUB_CMD)
    .about("Print Candidate Library Paths")
    .help_message("see `paths -h`")
    .arg(dir_arg.clone())
    .arg(setting_arg.clone());

  let load_subcommand = SubCommand::with_name(LOAD_SUB_CMD)
    .about("Load, Probe and Dispose The Library")
    .help_message("see `load -h`")
    .arg(dir_arg)
    .arg(setting_arg);

  let mut app = App::new("Unitex Engine Library Loader")
    .version(crate_version!())
    .arg(
      Arg::with_name(VERBOSE_ARG)
        .short("v")
        .multiple(true)
        .help("more log output (repeatable)"),
    )
    .arg(
      Arg::with_name(QUIET_ARG)
        .short("q")
        .help("no log output"),
    )
    .subcommand(paths_subcommand)
    .subcommand(load_subcommand)
    .subcommand(init_subcommand());
  let matches = app.clone().get_matches();
  init_logger(&matches);

  match matches.subcommand() {
    (PATHS_SUB_CMD, Some(paths_matches)) => paths(paths_matches),
    (LOAD_SUB_CMD, Some(load_matches)) => load(load_matches),
    (INIT_SUB_CMD, Some(init_matches)) => init(init_matches),
    _ => {
      if app.print_help().is_err() {
        exit(1);
      }
      println!();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn init_out_file(args: &[&str]) -> String {
    let matches = App::new("unitexloader")
      .subcommand(init_subcommand())
      .get_matches_from(args);
    let init_matches = matches.subcommand_matches(INIT_SUB_CMD).unwrap();
    setting_file_path(init_matches).to_string()
  }

  #[test]
  fn test_init_default_out_file() {
    assert_eq!(init_out_file(&["unitexloader", "init"]), DEFAULT_SETTING_FILE);
  }

  #[test]
  fn test_init_out_file() {
    assert_eq!(
      init_out_file(&["unitexloader", "init", "-o", "conf/loader.json"]),
      "conf/loader.json"
    );
  }
}
