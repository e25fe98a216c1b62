use std::env;
use std::net::SocketAddrV4;
use std::process::exit;

use tracing::error;

use rdftp::cmd::{parse_server_args, Command};
use rdftp::{logging, Server, ShutdownSignal, TRANSFER_BUFF_SIZE};

fn main() {
    let argv: Vec<String> = env::args().collect();

    let args = match parse_server_args(&argv) {
        Ok(Command::Run(a)) => a,
        Ok(Command::Help(usage)) => {
            println!("{}", usage);
            exit(0);
        }
        Err(m) => {
            eprintln!("server: ERROR: {}", m);
            exit(1);
        }
    };
    logging::init(args.verbose);

    let shutdown = match ShutdownSignal::install("server") {
        Ok(s) => s,
        Err(m) => {
            error!("server: ERROR: cannot install interrupt handler: {}", m);
            exit(1);
        }
    };
    let addr = SocketAddrV4::new(args.bind, args.port);
    let mut server = match Server::bind(addr, &args.out_dir, TRANSFER_BUFF_SIZE, shutdown) {
        Ok(s) => s,
        Err(m) => {
            error!("server: ERROR: {}", m);
            exit(1);
        }
    };

    // serve() only comes back on interruption or a fatal error
    if let Err(m) = server.serve() {
        error!("server: ERROR: {}", m);
    }
    server.release();
    exit(1);
}
