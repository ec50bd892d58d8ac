mod script;

use log::{error, info};
use rbt_config::{Config, LogSettings, parse_level};
use script::Session;
use simplelog::{
    ColorChoice, CombinedLogger, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::env;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

const USAGE: &str = "usage: rbt [--config PATH] [SCRIPT]

Runs tree commands from SCRIPT, or from stdin when no script is given.

commands:
  insert K...   insert keys
  erase K...    erase one node per key
  find K        print whether K is present and its color
  min | max     print the smallest or largest key
  dump [N]      print up to N keys in order
  check         validate the tree invariants
  len           print the number of keys
  clear         remove every key";

struct Args {
    config: Option<PathBuf>,
    script: Option<PathBuf>,
}

fn parse_args() -> Result<Option<Args>, Box<dyn std::error::Error>> {
    let mut args = Args {
        config: None,
        script: None,
    };
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            _ if args.script.is_none() => args.script = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument '{}'", arg).into()),
        }
    }

    Ok(Some(args))
}

fn initialize_logging(settings: &LogSettings) -> Result<(), Box<dyn std::error::Error>> {
    // RBT_LOG overrides the configured terminal level
    let level = match env::var("RBT_LOG") {
        Ok(name) => parse_level(&name)?,
        Err(_) => settings.level,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    if let Some(path) = &settings.file {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            simplelog::Config::default(),
            File::create(path)?,
        ));
    }

    CombinedLogger::init(loggers)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = parse_args()? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    initialize_logging(&config.log)?;

    let script = match &args.script {
        Some(path) => {
            info!("running script {}", path.display());
            fs::read_to_string(path)?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut session = Session::new(config.tree.clone())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = session.run(&script, &mut out) {
        error!("script aborted: {}", e);
        return Err(e.into());
    }

    Ok(())
}
