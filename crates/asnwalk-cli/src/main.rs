use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod decode;
mod dump;
mod input;
mod schema;

/// Grammar-driven BER/DER inspection tool.
#[derive(Parser)]
#[command(name = "asnwalk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging, including the decoder trace.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every TLV of the input.
    Dump {
        /// Type from the built-in PKIX1 module used to name the values.
        #[arg(short, long)]
        schema: Option<String>,
        /// Input files, DER or PEM (use - for stdin).
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Decode the input against a schema type and print the value tree.
    Decode {
        /// Type from the built-in PKIX1 module (e.g. Certificate).
        #[arg(short, long)]
        schema: String,
        /// Stop after the first complete top-level SEQUENCE.
        #[arg(long)]
        fast_stop: bool,
        /// Ignore a truncated tail after the first complete value.
        #[arg(long)]
        tolerate_garbage: bool,
        /// Print only the raw bytes of this dotted path, as hex.
        #[arg(short, long)]
        field: Option<String>,
        /// Input file, DER or PEM (use - for stdin).
        file: String,
    },
    /// Show the built-in module, or the expanded tree of one type.
    Schema {
        /// Type name; lists the module's assignments when omitted.
        name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Dump { schema, files } => dump::run(schema.as_deref(), files),
        Commands::Decode {
            schema,
            fast_stop,
            tolerate_garbage,
            field,
            file,
        } => decode::run(
            schema,
            decode::Options {
                fast_stop: *fast_stop,
                tolerate_garbage: *tolerate_garbage,
                debug: cli.verbose,
            },
            field.as_deref(),
            file,
        ),
        Commands::Schema { name } => schema::run(name.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
