use crate::cli::actions::{Action, server};
use crate::ports::PortSpec;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let ports: Vec<u16> = matches
        .get_many::<u16>("port")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    let ports = PortSpec::from_ports(&ports).context("invalid port specification")?;

    let data_dir = matches
        .get_one::<String>("data-dir")
        .map(PathBuf::from)
        .context("missing required argument: --data-dir")?;

    Ok(Action::Server(server::Args { ports, data_dir }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn single_port_becomes_single_spec() {
        let matches = commands::new().get_matches_from(vec!["pordisto", "-p", "3000"]);
        let Action::Server(args) = handler(&matches).expect("action");
        assert_eq!(args.ports, PortSpec::Single(3000));
        assert_eq!(args.data_dir, PathBuf::from("./auth-data"));
    }

    #[test]
    fn two_ports_become_a_range() {
        let matches = commands::new().get_matches_from(vec!["pordisto", "-p", "3000,3010"]);
        let Action::Server(args) = handler(&matches).expect("action");
        assert_eq!(args.ports, PortSpec::Range(3000, 3010));
    }

    #[test]
    fn three_ports_become_a_list() {
        let matches = commands::new().get_matches_from(vec!["pordisto", "-p", "3002,3000,3001"]);
        let Action::Server(args) = handler(&matches).expect("action");
        assert_eq!(args.ports, PortSpec::List(vec![3002, 3000, 3001]));
    }
}
