//! FlashSet - Typed Sorted Sets over a RESP Store
//!
//! Command-line client: runs one sorted-set operation against a server and
//! prints the result.

use anyhow::{anyhow, bail, Context};
use flashset::context::StoreSettings;
use flashset::converter::StringConverter;
use flashset::sorted_set::{Order, ScoreRange, ScoredMember, SortedSet};
use flashset::storage::ScoreBound;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Client configuration
struct Config {
    /// Server host
    host: String,
    /// Server port
    port: u16,
    /// Logical database index
    database: i64,
    /// Traverse from the highest score down
    descending: bool,
    /// Sorted-set key followed by the command and its arguments
    positional: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashset::DEFAULT_HOST.to_string(),
            port: flashset::DEFAULT_PORT,
            database: 0,
            descending: false,
            positional: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--db" | "-n" => {
                    if i + 1 < args.len() {
                        config.database = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid database index");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --db requires a value");
                        std::process::exit(1);
                    }
                }
                "--desc" => {
                    config.descending = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("FlashSet version {}", flashset::VERSION);
                    std::process::exit(0);
                }
                // Negative numbers such as "-1" or "-inf" are arguments, not flags.
                other if other.starts_with("--") => {
                    eprintln!("Unknown argument: {}", other);
                    print_help();
                    std::process::exit(1);
                }
                other => {
                    config.positional.push(other.to_string());
                    i += 1;
                }
            }
        }

        config
    }

    /// Returns the server address as a string
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn order(&self) -> Order {
        Order::from_ascending(!self.descending)
    }
}

fn print_help() {
    println!(
        r#"
FlashSet - Typed Sorted Sets over a RESP Store

USAGE:
    flashset [OPTIONS] <KEY> <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>    Server host (default: 127.0.0.1)
    -p, --port <PORT>    Server port (default: 6379)
    -n, --db <INDEX>     Logical database (default: 0)
        --desc           Highest score first for range, range-by-score, rank
    -v, --version        Print version information
        --help           Print this help message

COMMANDS:
    add <member> <score>          Add or re-score a member
    len [min max]                 Count members, optionally within scores
    incr <member> <delta>         Add delta to a member's score
    range [start stop]            Members by rank (default: 0 -1)
    range-by-score <min> <max>    Members by score; "(" excludes a bound
    rank <member>                 0-based position of a member
    rem <member>                  Remove a member

EXAMPLES:
    flashset board add ariz 120
    flashset board incr ariz 5
    flashset board range 0 9 --desc
    flashset board range-by-score "(100" +inf
    flashset -n 2 board rank ariz --desc
"#
    );
}

fn parse_score(text: &str) -> anyhow::Result<f64> {
    text.parse()
        .with_context(|| format!("invalid score: {}", text))
}

fn parse_index(text: &str) -> anyhow::Result<i64> {
    text.parse()
        .with_context(|| format!("invalid index: {}", text))
}

fn parse_bound(text: &str) -> anyhow::Result<ScoreBound> {
    ScoreBound::parse(text).ok_or_else(|| anyhow!("invalid score bound: {}", text))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG=flashset=trace shows every command sent
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (key, command, args) = match config.positional.as_slice() {
        [key, command, args @ ..] => (key.as_str(), command.as_str(), args),
        _ => {
            print_help();
            std::process::exit(1);
        }
    };

    let settings = StoreSettings::tcp(config.address()).with_database(config.database);
    let set: SortedSet<String, _> = SortedSet::from_settings(&settings, key, StringConverter);
    debug!(address = %config.address(), database = config.database, key, command, "Running");

    match (command, args) {
        ("add", [member, score]) => {
            let added = set.add(member, parse_score(score)?).await?;
            println!("(integer) {}", added as i64);
        }
        ("len", []) => {
            println!("(integer) {}", set.len().await?);
        }
        ("len", [min, max]) => {
            let count = set.len_by_score(parse_score(min)?, parse_score(max)?).await?;
            println!("(integer) {}", count);
        }
        ("incr", [member, delta]) => {
            let score = set.increment(member, parse_score(delta)?).await?;
            println!("{}", score);
        }
        ("range", []) => {
            print_members(set.range_by_rank(0, -1, config.order()).await?);
        }
        ("range", [start, stop]) => {
            let found = set
                .range_by_rank(parse_index(start)?, parse_index(stop)?, config.order())
                .await?;
            print_members(found);
        }
        ("range-by-score", [min, max]) => {
            let (min, max) = (parse_bound(min)?, parse_bound(max)?);
            let range = ScoreRange {
                min: min.value,
                max: max.value,
                min_inclusive: min.inclusive,
                max_inclusive: max.inclusive,
                ..ScoreRange::default()
            }
            .order(config.order());
            print_members(set.range_by_score(&range).await?);
        }
        ("rank", [member]) => match set.rank(member, config.order()).await? {
            Some(rank) => println!("(integer) {}", rank),
            None => println!("(nil)"),
        },
        ("rem", [member]) => {
            let removed = set.remove(member).await?;
            println!("(integer) {}", removed as i64);
        }
        ("add" | "len" | "incr" | "range" | "range-by-score" | "rank" | "rem", _) => {
            bail!("wrong number of arguments for '{}'", command);
        }
        _ => bail!("unknown command '{}'", command),
    }

    Ok(())
}

fn print_members(found: Vec<ScoredMember<String>>) {
    if found.is_empty() {
        println!("(empty array)");
        return;
    }
    for (i, entry) in found.iter().enumerate() {
        println!("{}) \"{}\" {}", i + 1, entry.member, entry.score);
    }
}
