use clap::{Arg, Command};
use etl::Phase;
use std::process;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .default_value("config/etl.toml")
        .help("Sets a custom config file")
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Sparkify warehouse ETL")
        .version("1.0")
        .about("Builds the songplays star schema from song and log data")
        .subcommand_required(true)
        .subcommand(
            Command::new("etl")
                .about("Run both phases: song data, then log data")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("song-data")
                .about("Build the songs and artists tables")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("log-data")
                .about("Build the users, time and songplays tables")
                .arg(config_arg()),
        )
        .get_matches();

    let Some((name, sub_matches)) = matches.subcommand() else {
        eprintln!("Please specify a valid subcommand");
        process::exit(1);
    };
    let Some(phase) = Phase::from_subcommand(name) else {
        eprintln!("Unknown subcommand: {}", name);
        process::exit(1);
    };

    let config_path = sub_matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/etl.toml");
    println!("Starting ETL pipeline with config: {}", config_path);

    if let Err(e) = etl::run_phase(config_path, phase).await {
        eprintln!("ETL pipeline error: {:#}", e);
        process::exit(1);
    }
}
