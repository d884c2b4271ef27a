//! Minimal feed subscriber. Connects per a TOML config, logs in when the
//! transport is TCP, subscribes, and prints everything that arrives until
//! `q` is read on stdin. Exits 0 on success, the negated error code
//! otherwise.

use epsclient::{
    ClientConfig, ClientSpi, ConnMode, EpsResult, EventKind, MktData, MktStatus, MktType,
};
use std::io::BufRead;
use std::process;
use std::sync::Arc;

struct PrintSpi {
    config: Arc<ClientConfig>,
}

impl ClientSpi for PrintSpi {
    fn on_connected(&self, hid: u32) {
        println!("==> connected, hid: {}", hid);

        // TCP sessions log in once the transport is up; UDP needs no
        // session and subscribes straight away.
        let result = match self.config.conn_mode() {
            Ok(ConnMode::Tcp) => epsclient::login(
                hid,
                &self.config.username,
                &self.config.password,
                self.config.heartbeat_intl,
            ),
            _ => self.subscribe(hid),
        };
        if let Err(error) = result {
            println!("==> request failed: {}", error);
        }
    }

    fn on_disconnected(&self, hid: u32, code: u32, reason: &str) {
        println!(
            "==> disconnected, hid: {}, code: {:#010x}, reason: {}",
            hid, code, reason
        );
    }

    fn on_login_rsp(&self, hid: u32, heartbeat_intl: u16, code: u32, reason: &str) {
        println!(
            "==> login response, hid: {}, heartbeat: {}, code: {:#010x}, reason: {}",
            hid, heartbeat_intl, code, reason
        );
        if code == 0 {
            if let Err(error) = self.subscribe(hid) {
                println!("==> subscribe failed: {}", error);
            }
        }
    }

    fn on_logout_rsp(&self, hid: u32, code: u32, reason: &str) {
        println!(
            "==> logout response, hid: {}, code: {:#010x}, reason: {}",
            hid, code, reason
        );
    }

    fn on_mkt_data_sub_rsp(&self, hid: u32, mkt_type: MktType, code: u32, reason: &str) {
        println!(
            "==> subscribe response, hid: {}, market: {:?}, code: {:#010x}, reason: {}",
            hid, mkt_type, code, reason
        );
    }

    fn on_mkt_data_arrived(&self, hid: u32, data: &MktData) {
        println!(
            "==> market data, hid: {}, market: {:?}, applID: {}, applSeqNum: {}, bytes: {}",
            hid,
            data.mkt_type,
            data.appl_id,
            data.appl_seq_num,
            data.md_data.len()
        );
    }

    fn on_mkt_status_changed(&self, hid: u32, status: &MktStatus) {
        println!(
            "==> market status, hid: {}, market: {:?}, status: {}",
            hid, status.mkt_type, status.mkt_status
        );
    }

    fn on_event_occurred(&self, hid: u32, kind: EventKind, code: u32, text: &str) {
        println!(
            "==> event, hid: {}, kind: {:?}, code: {:#010x}, text: {}",
            hid, kind, code, text
        );
    }
}

impl PrintSpi {
    fn subscribe(&self, hid: u32) -> EpsResult<()> {
        epsclient::subscribe(hid, self.config.mkt_type().unwrap_or(MktType::All))
    }
}

fn run(config_path: &str) -> EpsResult<()> {
    let config = Arc::new(ClientConfig::from_toml_file(config_path)?);
    let mode = config.conn_mode()?;
    config.mkt_type()?;

    epsclient::init_lib()?;

    let outcome = subscribe_until_quit(&config, mode);

    let _ = epsclient::uninit_lib();
    outcome
}

fn subscribe_until_quit(config: &Arc<ClientConfig>, mode: ConnMode) -> EpsResult<()> {
    let hid = epsclient::open_handle(mode)?;
    epsclient::register_spi(
        hid,
        Arc::new(PrintSpi {
            config: Arc::clone(config),
        }),
    )?;
    epsclient::connect(hid, &config.address)?;

    println!(">>> running, enter 'q' to quit");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    epsclient::close_handle(hid)
}

fn main() {
    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: simple_client <config.toml>");
            eprintln!();
            eprintln!("example config:");
            eprintln!("  mode = \"udp\"");
            eprintln!("  address = \"230.11.1.1:3333;196.123.71.1\"");
            eprintln!("  market = \"all\"");
            process::exit(0);
        }
    };

    if let Err(error) = run(&config_path) {
        eprintln!("error: {} ({})", error, epsclient::last_error());
        let code = error.code() as i32;
        process::exit(-code);
    }
}
