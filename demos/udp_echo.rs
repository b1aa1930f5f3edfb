//! UDP echo host on a TAP device.
//!
//! Brings the stack up on a TAP interface, answers ARP and ping, and echoes
//! every datagram received on the echo port back to its sender.
//!
//! ```text
//! sudo cargo run --example udp_echo -- --tap tap0
//! ping 10.0.0.1
//! nc -u 10.0.0.1 7
//! ```

mod utils;

use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use toy_netstack::{MacAddr, NetStack, StackConfig, TapDevice};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utils::configure_interface;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TAP interface to create or attach to.
    #[arg(long, default_value = "tap0")]
    tap: String,

    /// Address of the stack.
    #[arg(long, default_value = "10.0.0.1")]
    ip: Ipv4Addr,

    /// Hardware address of the stack.
    #[arg(long, default_value = "02:00:00:00:00:01")]
    mac: MacAddr,

    /// Host-side address assigned to the TAP interface.
    #[arg(long, default_value = "10.0.0.254/24")]
    host_cidr: String,

    /// Port to echo on.
    #[arg(long, default_value_t = 7)]
    port: u16,

    /// Interface MTU.
    #[arg(long, default_value_t = toy_netstack::config::DEFAULT_MTU)]
    mtu: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("toy_netstack=info,udp_echo=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let device = TapDevice::open(&args.tap)?;
    configure_interface(device.name(), &args.host_cidr)?;

    let config = StackConfig::new(args.ip, args.mac).with_mtu(args.mtu);
    let mut stack = NetStack::new(config, device)?;
    stack.udp_open(args.port)?;
    info!(port = args.port, "echo server listening");

    let mut last_dump = Instant::now();
    loop {
        let received = match stack.poll() {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "poll failed");
                false
            }
        };

        while let Some(datagram) = stack.udp_recv(args.port)? {
            info!(
                from = %datagram.src_addr,
                port = datagram.src_port,
                len = datagram.data.len(),
                "echo"
            );
            if let Err(e) =
                stack.udp_send(&datagram.data, args.port, datagram.src_addr, datagram.src_port)
            {
                warn!(error = %e, "echo failed");
            }
        }

        if last_dump.elapsed() >= Duration::from_secs(10) {
            print!("{}", stack.dump_arp_table());
            last_dump = Instant::now();
        }

        if !received {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
