use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::explorer::{self, ExplorerCliArgs, ExplorerConfig, QueryCliArgs, QueryConfig};

#[derive(Debug, Parser)]
#[command(name = "geosql", version, about = "Run SQL over spatial files and map the results")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the map explorer over HTTP.
    Serve(ExplorerCliArgs),
    /// Run one query and print the table, features or render layers.
    Query(QueryCliArgs),
}

pub fn handle_commands(args: &[String]) -> Result<()> {
    let cli = Cli::parse_from(args);
    match cli.command {
        Command::Serve(args) => explorer::serve(ExplorerConfig::try_from(args)?),
        Command::Query(args) => explorer::run_query(QueryConfig::try_from(args)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["geosql", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Command::Serve(ref args) if args.port == 9000));

        let cli = Cli::try_parse_from(["geosql", "query", "--sql", "SELECT 1"]).unwrap();
        assert!(matches!(cli.command, Command::Query(ref args) if args.sql == "SELECT 1"));
    }

    #[test]
    fn query_requires_sql() {
        assert!(Cli::try_parse_from(["geosql", "query"]).is_err());
    }
}
