use std::net::Ipv4Addr;
use std::path::PathBuf;

use getopts::{Matches, Options};

use crate::error::TransferError;

pub const MIN_PORT: i64 = 1024;
pub const MAX_PORT: i64 = 65535;

pub const DEFAULT_BIND: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// What a binary should do after looking at its arguments.
#[derive(Debug)]
pub enum Command<T> {
    Run(T),
    Help(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientArgs {
    pub host: String,
    pub port: u16,
    pub files: Vec<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerArgs {
    pub port: u16,
    pub bind: Ipv4Addr,
    pub out_dir: PathBuf,
    pub verbose: bool,
}

pub fn validate_port(raw: &str) -> Result<u16, TransferError> {
    let port: i64 = match raw.trim().parse() {
        Ok(p) => p,
        Err(_) => {
            return Err(TransferError::InvalidPort(raw.to_string()));
        }
    };
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(TransferError::PrivilegedPort(port));
    }
    Ok(port as u16)
}

fn common_options() -> Options {
    let mut opts = Options::new();
    opts.optflag("v", "verbose", "log resource handling as well as progress");
    opts.optflag("h", "help", "print this help menu");
    opts
}

fn parse(opts: &Options, argv: &[String]) -> Result<Matches, TransferError> {
    let args = argv.get(1..).unwrap_or(&[]);
    match opts.parse(args) {
        Ok(m) => Ok(m),
        Err(f) => Err(TransferError::Usage(f.to_string())),
    }
}

pub fn client_usage(opts: &Options) -> String {
    opts.usage("USAGE: client [options] <server_IP> <server_Port> file1 file2 ...")
}

pub fn server_usage(opts: &Options) -> String {
    opts.usage("USAGE: server [options] <listen_Port>")
}

pub fn parse_client_args(argv: &[String]) -> Result<Command<ClientArgs>, TransferError> {
    let opts = common_options();
    let matches = parse(&opts, argv)?;
    if matches.opt_present("h") {
        return Ok(Command::Help(client_usage(&opts)));
    }
    if matches.free.len() < 3 {
        return Err(TransferError::Usage(client_usage(&opts)));
    }
    let port = validate_port(&matches.free[1])?;

    Ok(Command::Run(ClientArgs {
        host: matches.free[0].clone(),
        port,
        files: matches.free[2..].iter().map(PathBuf::from).collect(),
        verbose: matches.opt_present("v"),
    }))
}

pub fn parse_server_args(argv: &[String]) -> Result<Command<ServerArgs>, TransferError> {
    let mut opts = common_options();
    opts.optopt("b", "bind", "IPv4 address to listen on (default 127.0.0.1)", "ADDR");
    opts.optopt("d", "dir", "directory received files are saved into", "DIR");
    let matches = parse(&opts, argv)?;
    if matches.opt_present("h") {
        return Ok(Command::Help(server_usage(&opts)));
    }
    if matches.free.len() != 1 {
        return Err(TransferError::Usage(server_usage(&opts)));
    }
    let port = validate_port(&matches.free[0])?;

    let bind = match matches.opt_str("b") {
        Some(s) => match s.parse::<Ipv4Addr>() {
            Ok(a) => a,
            Err(_) => {
                return Err(TransferError::InvalidAddress(s));
            }
        },
        None => DEFAULT_BIND,
    };
    let out_dir = matches
        .opt_str("d")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(Command::Run(ServerArgs {
        port,
        bind,
        out_dir,
        verbose: matches.opt_present("v"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn port_range_is_inclusive() {
        assert_eq!(validate_port("1024").unwrap(), 1024);
        assert_eq!(validate_port("65535").unwrap(), 65535);
        assert!(matches!(validate_port("1023"), Err(TransferError::PrivilegedPort(1023))));
        assert!(matches!(validate_port("65536"), Err(TransferError::PrivilegedPort(65536))));
        assert!(matches!(validate_port("0"), Err(TransferError::PrivilegedPort(0))));
        assert!(matches!(validate_port("-5000"), Err(TransferError::PrivilegedPort(-5000))));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        assert!(matches!(validate_port("http"), Err(TransferError::InvalidPort(_))));
        assert!(matches!(validate_port(""), Err(TransferError::InvalidPort(_))));
    }

    #[test]
    fn client_keeps_file_order() {
        let cmd = parse_client_args(&argv(&[
            "client",
            "127.0.0.1",
            "8080",
            "b.txt",
            "a.txt",
        ]))
        .unwrap();
        match cmd {
            Command::Run(args) => {
                assert_eq!(args.host, "127.0.0.1");
                assert_eq!(args.port, 8080);
                assert_eq!(args.files, vec![PathBuf::from("b.txt"), PathBuf::from("a.txt")]);
                assert!(!args.verbose);
            }
            Command::Help(_) => panic!("expected run"),
        }
    }

    #[test]
    fn client_needs_at_least_one_file() {
        let res = parse_client_args(&argv(&["client", "127.0.0.1", "8080"]));
        assert!(matches!(res, Err(TransferError::Usage(_))));
    }

    #[test]
    fn client_rejects_privileged_port() {
        let res = parse_client_args(&argv(&["client", "127.0.0.1", "80", "a.txt"]));
        assert!(matches!(res, Err(TransferError::PrivilegedPort(80))));
    }

    #[test]
    fn server_defaults_to_loopback() {
        match parse_server_args(&argv(&["server", "9000"])).unwrap() {
            Command::Run(args) => {
                assert_eq!(args.port, 9000);
                assert_eq!(args.bind, Ipv4Addr::LOCALHOST);
                assert_eq!(args.out_dir, PathBuf::from("."));
            }
            Command::Help(_) => panic!("expected run"),
        }
    }

    #[test]
    fn server_bind_and_dir_options() {
        let cmd = parse_server_args(&argv(&[
            "server", "-b", "0.0.0.0", "--dir", "/tmp/in", "-v", "9000",
        ]));
        match cmd.unwrap() {
            Command::Run(args) => {
                assert_eq!(args.bind, Ipv4Addr::UNSPECIFIED);
                assert_eq!(args.out_dir, PathBuf::from("/tmp/in"));
                assert!(args.verbose);
            }
            Command::Help(_) => panic!("expected run"),
        }
    }

    #[test]
    fn server_argument_count() {
        assert!(matches!(parse_server_args(&argv(&["server"])), Err(TransferError::Usage(_))));
        assert!(matches!(
            parse_server_args(&argv(&["server", "9000", "9001"])),
            Err(TransferError::Usage(_))
        ));
    }

    #[test]
    fn help_wins_over_missing_arguments() {
        assert!(matches!(parse_server_args(&argv(&["server", "-h"])), Ok(Command::Help(_))));
        assert!(matches!(parse_client_args(&argv(&["client", "--help"])), Ok(Command::Help(_))));
    }
}
