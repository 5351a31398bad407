use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use quarry_eval::{Expression, Schema, events_from_json_lines};
use quarry_parser::{parse_query, validate};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Parse and evaluate quarry telemetry queries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query and print its AST as JSON
    Parse {
        /// The query expression
        query: String,

        /// Pretty-print JSON output
        #[arg(short, long, default_value_t = true)]
        pretty: bool,
    },

    /// Filter a JSON-lines event stream through a query
    ///
    /// Events are objects like
    /// {"name": "conn", "id": 7, "timestamp": "...", "record": [...]}.
    /// Matching lines are echoed to stdout.
    Filter {
        /// The query expression
        query: String,

        /// Path to a JSON-lines event file; stdin when omitted
        path: Option<PathBuf>,

        /// Print the number of matches instead of the matching lines
        #[arg(short, long)]
        count: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Parse { query, pretty } => cmd_parse(&query, pretty),
        Commands::Filter {
            query,
            path,
            count,
        } => cmd_filter(&query, path.as_deref(), count),
    };
    process::exit(code);
}

fn cmd_parse(query: &str, pretty: bool) -> i32 {
    let ast = match parse_query(query) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };
    if let Err(e) = validate(query, &ast) {
        eprintln!("error: {e}");
        return 1;
    }

    let rendered = if pretty {
        serde_json::to_string_pretty(&ast)
    } else {
        serde_json::to_string(&ast)
    };
    match rendered {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn cmd_filter(query: &str, path: Option<&std::path::Path>, count: bool) -> i32 {
    let mut expr = match Expression::compile(query, Schema::default()) {
        Ok(expr) => expr,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let input = match read_input(path) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let events = match events_from_json_lines(&input) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let lines: Vec<&str> = input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let mut matches = 0usize;
    for (event, line) in events.iter().zip(lines) {
        if expr.eval(event) {
            matches += 1;
            if !count {
                println!("{line}");
            }
        }
    }

    if count {
        println!("{matches}");
    }
    0
}

fn read_input(path: Option<&std::path::Path>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
