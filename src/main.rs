use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use scoreserver::{Config, Db};
use structopt::StructOpt;

#[derive(StructOpt)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,

    #[structopt(long = "config")]
    config: PathBuf,
}

#[derive(StructOpt)]
enum Command {
    #[structopt(name = "run")]
    Run,

    #[structopt(name = "migrate")]
    Migrate,
}

fn main() {
    env_logger::builder().default_format_timestamp(false).init();
    let opt = Opt::from_args();

    // read the config file
    let mut file = File::open(opt.config).expect("config file couldn't be opened");
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .expect("failed to read config");
    let config: Config = toml::from_slice(contents.as_slice()).expect("couldn't parse config");

    // connect to the db
    let db = Db::connect(&config.db).expect("couldn't connect to the db");

    match &opt.cmd {
        Command::Run => {
            let bind_addr = config.bind_addr;
            scoreserver::web::run(config, bind_addr, db);
        }
        Command::Migrate => {
            db.migrate().expect("failed to migrate");
        }
    }
}
