use crate::config::DEFAULT_BASE_PATH;
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .help("increase verbosity, -vv for trace")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(migrate())
}

#[allow(clippy::too_many_lines)]
fn migrate() -> Command {
    Command::new("migrate")
        .about("move sites to another host and point their DNS records at it")
        .arg(
            Arg::new("plan")
                .help("plan document (JSON or YAML) mapping domains to {from, to, delayUntil}")
                .long("plan")
                .short('p')
                .value_name("PATH")
                .conflicts_with("sites"),
        )
        .arg(
            Arg::new("sites")
                .help("glob of site directories under --base-path, e.g. '*.example.com'")
                .long("sites")
                .short('s')
                .value_name("GLOB")
                .requires("target"),
        )
        .arg(
            Arg::new("target")
                .env("SITEHOP_TARGET")
                .help("[user@]host[:path] receiving the sites; default for plan entries without `to`")
                .long("target")
                .short('t')
                .value_name("HOST"),
        )
        .arg(
            Arg::new("base-path")
                .default_value(DEFAULT_BASE_PATH)
                .env("SITEHOP_BASE_PATH")
                .help("directory holding one sub-directory per site on the source")
                .long("base-path")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("target-path")
                .env("SITEHOP_TARGET_PATH")
                .help("directory receiving the sites on the target (default: --base-path)")
                .long("target-path")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("dry-run")
                .help("log every action without changing anything")
                .long("dry-run")
                .short('n')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("delay-until")
                .help("do not migrate before this time, for entries without their own delay")
                .long("delay-until")
                .long_help(
                    "Do not migrate before this time. Applies to plan entries without delayUntil.\n\n\
                    Accepted notations, tried in order:\n\
                    - natural language: 'tomorrow 9am', 'next friday', 'tonight', 'noon'\n\
                    - offsets: 'in 2h', 'now+30m', '+90m', '1h30m'\n\
                    - epoch seconds or milliseconds: 1767225600\n\
                    - dates: '2026-01-01T09:00:00Z', '2026-01-01 09:00', '01/02/2026'"
                )
                .value_name("WHEN"),
        )
        .arg(
            Arg::new("skip-dump")
                .help("do not export the database before transfer")
                .long("skip-dump")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("archive-dir")
                .env("SITEHOP_ARCHIVE_DIR")
                .help("move the source directory here after migration")
                .long("archive-dir")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("archive-timestamp")
                .help("suffix archived directories with the current time")
                .long("archive-timestamp")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("archive-compress")
                .help("replace the archived directory with a compressed tarball")
                .long("archive-compress")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("compression")
                .default_value("gzip")
                .help("compression for --archive-compress: gzip or zstd")
                .long("compression")
                .value_name("KIND"),
        )
        .arg(
            Arg::new("delete")
                .help("delete the source directory after migration (asks first)")
                .long("delete")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force-delete")
                .help("delete the source directory without asking")
                .long("force-delete")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-dns")
                .help("leave DNS records untouched")
                .long("skip-dns")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("cf-api-token")
                .env("CLOUDFLARE_API_TOKEN")
                .help("Cloudflare API token")
                .long("cf-api-token")
                .value_name("TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("cf-email")
                .env("CLOUDFLARE_EMAIL")
                .help("Cloudflare account email, used with --cf-api-key")
                .long("cf-email")
                .value_name("EMAIL"),
        )
        .arg(
            Arg::new("cf-api-key")
                .env("CLOUDFLARE_API_KEY")
                .help("Cloudflare global API key, used with --cf-email")
                .long("cf-api-key")
                .value_name("KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("dns-ttl")
                .default_value("120")
                .help("TTL in seconds for updated records")
                .long("dns-ttl")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("no-proxy")
                .help("update records with the Cloudflare proxy disabled")
                .long("no-proxy")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ssh-user")
                .env("SITEHOP_SSH_USER")
                .help("user for hosts given without user@")
                .long("ssh-user")
                .value_name("USER"),
        )
        .arg(
            Arg::new("ssh-port")
                .default_value("22")
                .env("SITEHOP_SSH_PORT")
                .help("ssh port")
                .long("ssh-port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("ssh-key")
                .env("SITEHOP_SSH_KEY")
                .help("ssh identity file")
                .long("ssh-key")
                .short('i')
                .value_name("PATH"),
        )
        .arg(
            Arg::new("ssh-timeout")
                .default_value("10")
                .help("ssh connect timeout in seconds")
                .long("ssh-timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("json")
                .help("print the run summary as JSON")
                .long("json")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_new() {
        let cmd = new();
        assert_eq!(cmd.get_name(), "sitehop");
        assert_eq!(
            cmd.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            cmd.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_debug_assert() {
        new().debug_assert();
    }

    #[test]
    fn test_subcommand_required() {
        assert!(new().try_get_matches_from(vec!["sitehop"]).is_err());
    }

    #[test]
    fn test_migrate_defaults() {
        let m = new()
            .try_get_matches_from(vec!["sitehop", "migrate", "--plan", "plan.yml"])
            .unwrap();
        let (name, sub) = m.subcommand().unwrap();
        assert_eq!(name, "migrate");
        assert_eq!(sub.get_one::<String>("plan").map(String::as_str), Some("plan.yml"));
        assert_eq!(sub.get_one::<u16>("ssh-port").copied(), Some(22));
        assert_eq!(sub.get_one::<u64>("ssh-timeout").copied(), Some(10));
        assert_eq!(sub.get_one::<u32>("dns-ttl").copied(), Some(120));
        assert_eq!(
            sub.get_one::<String>("compression").map(String::as_str),
            Some("gzip")
        );
        assert!(!sub.get_flag("dry-run"));
        assert!(!sub.get_flag("no-proxy"));
    }

    #[test]
    fn test_verbose_counts() {
        let m = new()
            .try_get_matches_from(vec!["sitehop", "-vv", "migrate", "--plan", "p.json"])
            .unwrap();
        assert_eq!(m.get_count("verbose"), 2);
    }

    #[test]
    fn test_plan_conflicts_with_sites() {
        let result = new().try_get_matches_from(vec![
            "sitehop", "migrate", "--plan", "p.yml", "--sites", "*.com", "--target", "host2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sites_requires_target() {
        if std::env::var("SITEHOP_TARGET").is_ok() {
            return;
        }
        let result = new().try_get_matches_from(vec!["sitehop", "migrate", "--sites", "*.com"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port() {
        let result = new().try_get_matches_from(vec![
            "sitehop", "migrate", "--plan", "p.yml", "--ssh-port", "99999",
        ]);
        assert!(result.is_err());
    }
}
