use clap::{arg,crate_version,Command};
use flate2::read::GzDecoder;
use replaydecoder::replay;

const RCH: &str = "unreachable was reached";

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    let long_help =
"Examples:
---------
Decode to stdout:    `replaydecoder my_match.rec`
Decode gzipped:      `replaydecoder --is-gzip my_match.rec.gz`
Write a JSON file:   `replaydecoder -q -o my_match.json my_match.rec`";

    let main_cmd = Command::new("replaydecoder")
        .about("Decode l33t-compressed RTS replay files")
        .after_long_help(long_help)
        .version(crate_version!())
        .arg(arg!(<PATH> "replay file path"))
        .arg(arg!(--"is-gzip" "treat the input as gzip-wrapped"))
        .arg(arg!(-v --verbose "enable debug logging"))
        .arg(arg!(-o --output <PATH> "write the JSON document to PATH").required(false))
        .arg(arg!(-q --quiet "do not print the document to stdout"));

    let matches = main_cmd.get_matches();

    let default_level = match matches.get_flag("verbose") {
        true => "debug",
        false => "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let path = matches.get_one::<String>("PATH").expect(RCH);
    let file = std::fs::File::open(path)?;
    let replay = match matches.get_flag("is-gzip") {
        true => replay::parse_replay(&mut GzDecoder::new(file))?,
        false => replay::parse_replay(&mut std::io::BufReader::new(file))?
    };
    let json = replay.to_json()?;

    if !matches.get_flag("quiet") {
        println!("{}",json);
    }
    if let Some(out_path) = matches.get_one::<String>("output") {
        std::fs::write(out_path,json)?;
    }

    Ok(())
}
