use clap::{App, Arg};

type Error = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), Error> {
    env_logger::Builder::from_default_env().init();

    let matches = App::new("codegdb")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::with_name("port").long("port").takes_value(true))
        .arg(Arg::with_name("file").long("file").takes_value(true).required(true))
        .arg(
            Arg::with_name("language")
                .long("language")
                .takes_value(true)
                .possible_values(&["c", "cpp", "go"]),
        )
        .arg(Arg::with_name("codeFile").long("codeFile").takes_value(true))
        .get_matches();

    codegdb::debug_server(&matches)
}
