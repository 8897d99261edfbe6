//! CLI for manual/ops use, exercising the same engine the `http` facade
//! calls. Grounded on the teacher's `bin/monocle.rs` (`clap::Parser`,
//! `--json` global flag, `json_to_table`/`tabled` for human-readable
//! output).

use clap::{Parser, Subcommand};
use json_to_table::json_to_table;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::Level;

use prefixcollate::adapters::{BgpAdapter, IrrAdapter, RirStatsAdapter};
use prefixcollate::config::AppConfig;
use prefixcollate::model::ObjectClass;
use prefixcollate::{Collector, PrefixFloor};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Output as a JSON object instead of a table
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up everything known about a prefix.
    Prefix {
        /// A CIDR prefix or bare IP address, e.g. "1.1.1.0/24".
        prefix: String,
    },
    /// Look up everything an ASN originates or overlaps with.
    Asn {
        /// An AS number, e.g. "13335" or "AS13335".
        asn: String,
    },
    /// Expand an as-set or route-set into its members.
    Expand {
        /// The set name, e.g. "AS-EXAMPLE".
        target: String,
    },
    /// Find the sets that list a target as a member.
    MemberOf {
        /// "as-set" or "route-set".
        object_class: String,
        /// The target to search for, e.g. an ASN or route-set name.
        target: String,
    },
    /// Print the most recent import timestamps per source.
    Metadata,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: unable to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let pool = match PgPoolOptions::new().max_connections(5).connect(&config.database_url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("ERROR: unable to connect to database: {e}");
            std::process::exit(1);
        }
    };

    let irr = IrrAdapter::new(config.irrd_endpoint.clone());
    let bgp = BgpAdapter::new(pool.clone(), config.max_query_results);
    let rirstats = RirStatsAdapter::new(pool);
    let floor = PrefixFloor {
        ipv4: config.minimum_prefix_size_ipv4,
        ipv6: config.minimum_prefix_size_ipv6,
    };
    let collector = Collector::new(irr, bgp, rirstats, floor);

    let result = match cli.command {
        Commands::Prefix { prefix } => match prefix.parse() {
            Ok(net) => collector.prefix_summary(net).await.map(|v| json!(v)),
            Err(_) => {
                eprintln!("ERROR: {prefix} is not a valid prefix or IP address");
                std::process::exit(1);
            }
        },
        Commands::Asn { asn } => {
            let digits = asn.trim_start_matches("AS").trim_start_matches("as");
            match digits.parse() {
                Ok(asn) => collector.asn_summary(asn).await.map(|v| json!(v)),
                Err(_) => {
                    eprintln!("ERROR: {asn} is not a valid ASN");
                    std::process::exit(1);
                }
            }
        }
        Commands::Expand { target } => {
            let irr = IrrAdapter::new(config.irrd_endpoint.clone());
            prefixcollate::expand::expand_set(&irr, &target, config.set_size_limit, config.set_expansion_timeout())
                .await
                .map(|outcome| json!(outcome.results))
        }
        Commands::MemberOf { object_class, target } => {
            let Some(object_class) = ObjectClass::from_str_loose(&object_class) else {
                eprintln!("ERROR: unknown object class: {object_class}");
                std::process::exit(1);
            };
            let irr = IrrAdapter::new(config.irrd_endpoint.clone());
            prefixcollate::collector::member_of(&irr, &target, object_class)
                .await
                .map(|v| json!(v))
        }
        Commands::Metadata => collector.metadata().await.map(|v| json!(v)),
    };

    match result {
        Ok(value) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            } else {
                let mut table = json_to_table(&value);
                table.collapse();
                println!("{table}");
            }
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
}
