//! Command-line surface (spec §6). Parsing itself is explicitly
//! out-of-core-scope, but the flags and their meaning are still part of the
//! documented external interface, so they get a real `StructOpt` struct
//! rather than being left to the binary to improvise.

use std::path::PathBuf;

use structopt::StructOpt;

/// Default DSP domain name, used when `-d` is not given.
pub const DEFAULT_DSP: &str = "adsp";

/// Default sensor-registry/ACDB data root, used when `-R` is not given.
pub const DEFAULT_ROOT_DIR: &str = "/var/lib/qcom";

#[derive(Debug, StructOpt)]
#[structopt(name = "hexagonrpcd", about = "FastRPC reverse-tunnel broker for a Hexagon DSP")]
pub struct Flags {
    /// DSP domain to attach to (e.g. "adsp", "slpi").
    #[structopt(short = "d", long = "dsp", default_value = "adsp")]
    pub dsp: String,

    /// FastRPC kernel device node to open, e.g. /dev/adsprpc-smd.
    #[structopt(short = "f", long = "device")]
    pub device_node: PathBuf,

    /// A client program to spawn after attaching, with HEXAGONRPC_FD set in
    /// its environment. May be repeated.
    #[structopt(short = "p", long = "program")]
    pub client_programs: Vec<String>,

    /// Root directory HexagonFS mounts are resolved relative to.
    #[structopt(short = "R", long = "root", default_value = "/var/lib/qcom")]
    pub root_dir: PathBuf,

    /// Attach to the sensors ("SNS") DSP domain instead of the default one.
    #[structopt(short = "s", long = "sensors")]
    pub sensors: bool,
}

/// Process exit codes this daemon returns, per spec §6.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitCode {
    Success = 0,
    OptionOrResourceError = 1,
    DeviceOpenError = 3,
    PostAttachError = 4,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_node_is_required() {
        let err = Flags::from_iter_safe(&["hexagonrpcd"]).unwrap_err();
        assert_eq!(err.kind, structopt::clap::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn client_programs_may_repeat() {
        let flags = Flags::from_iter_safe(&[
            "hexagonrpcd",
            "-f",
            "/dev/adsprpc-smd",
            "-p",
            "chre",
            "-p",
            "sensor-core",
        ])
        .unwrap();
        assert_eq!(flags.client_programs, vec!["chre".to_string(), "sensor-core".to_string()]);
    }

    #[test]
    fn defaults_match_spec() {
        let flags = Flags::from_iter_safe(&["hexagonrpcd", "-f", "/dev/adsprpc-smd"]).unwrap();
        assert_eq!(flags.dsp, DEFAULT_DSP);
        assert_eq!(flags.root_dir, PathBuf::from(DEFAULT_ROOT_DIR));
        assert!(!flags.sensors);
    }
}
