//! The `hexagonrpcd` binary: parses the CLI surface (spec §6), attaches to
//! the FastRPC kernel device, builds the HexagonFS tree and interface
//! registry, publishes `HEXAGONRPC_FD` to any requested client programs, and
//! runs the reverse-tunnel listener loop until the device goes away.
//!
//! Grounded on `fastrpc/rpcd.c`'s `main()`: open the device node, issue
//! `INIT_ATTACH`/`INIT_ATTACH_SNS`, register the default listener, spawn any
//! `-p` client programs with the FD in their environment, then block in the
//! listener loop on the main thread (the "application thread" of spec §5 is
//! these spawned children, not a thread this daemon owns itself — the
//! concrete CHRE/sensor-core clients are out of core scope per spec §1).

use std::os::unix::io::AsRawFd;
use std::process::Command;

use nix::fcntl::{self, FcntlArg, FdFlag};
use structopt::StructOpt;

use hexagonrpcd::flags::{ExitCode, Flags};
use hexagonrpcd::session::HEXAGONRPC_FD_VAR;
use hexagonrpcd::{apps_std, hexagonfs, interface, kernel, listener, localctl};

fn main() {
    env_logger::init();
    let flags = Flags::from_args();

    let code = match run(&flags) {
        Ok(()) => ExitCode::Success,
        Err(code) => code,
    };
    std::process::exit(code.as_i32());
}

fn run(flags: &Flags) -> Result<(), ExitCode> {
    let device = std::fs::OpenOptions::new().read(true).write(true).open(&flags.device_node).map_err(|e| {
        log::error!("could not open {}: {}", flags.device_node.display(), e);
        ExitCode::DeviceOpenError
    })?;
    let fd = device.as_raw_fd();

    let attach = if flags.sensors { kernel::init_attach_sns(fd) } else { kernel::init_attach(fd) };
    attach.map_err(|e| {
        log::error!("failed to attach to DSP: {}", e);
        ExitCode::PostAttachError
    })?;

    let (tree, root) = hexagonfs::builder::construct_root_dir(&flags.root_dir, &flags.dsp);

    let apps_std = apps_std::AppsStd::new(tree, root).map_err(|e| {
        log::error!("could not build HexagonFS session: {}", e);
        ExitCode::PostAttachError
    })?;

    let mut registry = interface::Registry::new();
    let names = vec!["remotectl".to_string(), "apps_std".to_string()];
    registry.register("remotectl", Box::new(localctl::LocalCtl::new(names)));
    registry.register("apps_std", Box::new(apps_std));

    listener::register_default_listener(fd).map_err(|e| {
        log::error!("could not register default listener: {}", e);
        ExitCode::PostAttachError
    })?;

    // Clear FD_CLOEXEC so the fd survives into any `-p` client program we
    // spawn below; those children are expected to pick it up via
    // `HEXAGONRPC_FD` rather than reopening the device themselves.
    fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map_err(|e| {
        log::error!("could not clear FD_CLOEXEC on the device fd: {}", e);
        ExitCode::PostAttachError
    })?;

    std::env::set_var(HEXAGONRPC_FD_VAR, fd.to_string());
    let mut children = Vec::new();
    for program in &flags.client_programs {
        match Command::new(program).spawn() {
            Ok(child) => children.push(child),
            Err(e) => log::warn!("could not spawn client program {:?}: {}", program, e),
        }
    }

    if let Err(e) = listener::run_fastrpc_listener(fd, &mut registry) {
        log::error!("listener loop exited: {}", e);
    }

    for mut child in children {
        let _ = child.wait();
    }

    Ok(())
}
