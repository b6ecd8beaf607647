use anyhow::Result;
use clap::{App, Arg};
use log::{debug, info};
use rusty_p4_controller::app::Program;
use rusty_p4_controller::p4rt::bmv2::Bmv2Connector;
use rusty_p4_controller::p4rt::pipeconf::DefaultPipeconf;
use rusty_p4_controller::{Controller, ControllerError, RuleSet};
use std::path::{Path, PathBuf};

const P4INFO_ARG: &str = "p4info";
const BMV2_JSON_ARG: &str = "bmv2-json";
const PROGRAM_ARG: &str = "program";
const RULES_ARG: &str = "rules";

const P4INFO_HELP: &str =
    "p4info proto in text format from p4c [default: ./build/<program>.p4.p4info.txt]";

fn app() -> App<'static, 'static> {
    App::new("mycontroller")
        .version(env!("CARGO_PKG_VERSION"))
        .about("P4Runtime Controller")
        .arg(
            Arg::with_name(P4INFO_ARG)
                .long(P4INFO_ARG)
                .help(P4INFO_HELP)
                .value_name("FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(BMV2_JSON_ARG)
                .long(BMV2_JSON_ARG)
                .help("BMv2 JSON file from p4c [default: ./build/<program>.json]")
                .value_name("FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(PROGRAM_ARG)
                .long(PROGRAM_ARG)
                .help("built-in rule set to install")
                .possible_values(Program::NAMES)
                .default_value("load_balance")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(RULES_ARG)
                .long(RULES_ARG)
                .help("JSON rule set to install instead of the built-in one")
                .value_name("FILE")
                .takes_value(true),
        )
}

/// Prints usage and a hint, then exits with status 1.
fn missing_file(what: &str, path: &Path) -> ! {
    let _ = app().print_help();
    println!("\n{} not found: {}\nHave you run 'make'?", what, path.display());
    std::process::exit(1)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = app().get_matches();
    flexi_logger::Logger::with_env_or_str("info").start()?;

    let program: Program = matches
        .value_of(PROGRAM_ARG)
        .unwrap_or("load_balance")
        .parse()
        .map_err(anyhow::Error::msg)?;
    let p4info = matches
        .value_of(P4INFO_ARG)
        .map(PathBuf::from)
        .unwrap_or_else(|| program.default_p4info_path());
    let bmv2_json = matches
        .value_of(BMV2_JSON_ARG)
        .map(PathBuf::from)
        .unwrap_or_else(|| program.default_bmv2_json_path());

    if !p4info.exists() {
        missing_file("p4info file", &p4info);
    }
    if !bmv2_json.exists() {
        missing_file("BMv2 JSON file", &bmv2_json);
    }

    let rule_set = match matches.value_of(RULES_ARG) {
        Some(path) => RuleSet::load(Path::new(path))?,
        None => program.rule_set(),
    };
    for switch in &rule_set.switches {
        debug!("{}: {} entries", switch, rule_set.entries_for(&switch.name).count());
    }

    let pipeconf = DefaultPipeconf::new(program.name(), &p4info, &bmv2_json)?;
    let mut controller = Controller::new(Bmv2Connector::default(), pipeconf);
    match controller
        .run_until(&rule_set, tokio::signal::ctrl_c())
        .await
    {
        Ok(()) => {
            info!("done");
            Ok(())
        }
        Err(ControllerError::Interrupted) => Ok(()),
        Err(ControllerError::Device(e)) if e.is_rpc_failure() => Ok(()),
        // Local failures, already logged.
        Err(_) => std::process::exit(1),
    }
}
