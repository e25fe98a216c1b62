use std::env;
use std::process::exit;

use tracing::{error, info};

use rdftp::cmd::{parse_client_args, Command};
use rdftp::{logging, Client, ShutdownSignal, TRANSFER_BUFF_SIZE};

fn main() {
    let argv: Vec<String> = env::args().collect();

    let args = match parse_client_args(&argv) {
        Ok(Command::Run(a)) => a,
        Ok(Command::Help(usage)) => {
            println!("{}", usage);
            exit(0);
        }
        Err(m) => {
            eprintln!("client: ERROR: {}", m);
            exit(1);
        }
    };
    logging::init(args.verbose);

    let shutdown = match ShutdownSignal::install("client") {
        Ok(s) => s,
        Err(m) => {
            error!("client: ERROR: cannot install interrupt handler: {}", m);
            exit(1);
        }
    };
    let mut client = match Client::new(&args.host, args.port, TRANSFER_BUFF_SIZE, shutdown) {
        Ok(c) => c,
        Err(m) => {
            error!("client: ERROR: {}", m);
            exit(1);
        }
    };

    match client.send_all(&args.files) {
        Ok(report) => {
            info!(
                "client: File transfer(s) complete. ({} sent, {} failed)",
                report.sent, report.failed
            );
            info!("client: Goodbye!");
            client.release();
        }
        Err(m) => {
            error!("client: ERROR: {}", m);
            client.release();
            exit(1);
        }
    }
}
