//! dco-ctl — operator tool for the dco data channel.
//!
//! Reads key material from the dco config file and runs the transform
//! locally; there is no daemon to talk to.

use anyhow::{Context, Result};

mod cmd;

use cmd::{bind, config, packet, selftest};

fn print_usage() {
    println!("Usage: dco-ctl <command>");
    println!();
    println!("Commands:");
    println!("  config                     Print the effective configuration");
    println!("  init [--random-keys]       Write a config file if none exists");
    println!("  selftest [--count N] [--size N]");
    println!("                             Loop packets through a slot and its mirror");
    println!("  encap <hex>                Encapsulate one payload with the local keys");
    println!("  decap <hex> [--mirror]     Decapsulate one wire packet");
    println!("                             (--mirror: as the remote end would)");
    println!("  bind <addr>...             Install bindings on a peer in turn");
    println!();
    println!("Environment:");
    println!("  DCO_CONFIG      Config file path override");
    println!("  RUST_LOG        Log filter, e.g. dco_core=debug");
}

fn flag_value(args: &[&str], name: &str, default: usize) -> Result<usize> {
    match args.iter().position(|a| *a == name) {
        Some(i) => args
            .get(i + 1)
            .with_context(|| format!("{name} requires a value"))?
            .parse()
            .with_context(|| format!("{name} must be a number")),
        None => Ok(default),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["config"] | [] => config::cmd_config(),
        ["init"] => config::cmd_init(false),
        ["init", "--random-keys"] => config::cmd_init(true),
        ["selftest", rest @ ..] => {
            let count = flag_value(rest, "--count", selftest::DEFAULT_COUNT)?;
            let size = flag_value(rest, "--size", selftest::DEFAULT_SIZE)?;
            selftest::cmd_selftest(count, size)
        }
        ["encap", hex] => packet::cmd_encap(hex),
        ["decap", hex] => packet::cmd_decap(hex, false),
        ["decap", hex, "--mirror"] => packet::cmd_decap(hex, true),
        ["bind", addrs @ ..] if !addrs.is_empty() => bind::cmd_bind(addrs),
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
