use std::io;
use std::process::Command;

use tracing::info;

/// Assigns the host-side address to the TAP interface and brings it up.
pub fn configure_interface(iface_name: &str, ip_cidr: &str) -> io::Result<()> {
    // ip addr add <ip_cidr> dev <iface_name>
    run_ip(&["addr", "add", ip_cidr, "dev", iface_name])?;
    // ip link set up dev <iface_name>
    run_ip(&["link", "set", "up", "dev", iface_name])?;

    info!(iface = iface_name, ip = ip_cidr, "host side configured");
    Ok(())
}

fn run_ip(args: &[&str]) -> io::Result<()> {
    let status = Command::new("ip").args(args).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` failed with {status}", args.join(" ")),
        ));
    }
    Ok(())
}
