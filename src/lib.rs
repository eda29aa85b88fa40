//! `hexagonrpcd`: a user-space broker for Qualcomm-style FastRPC traffic
//! between a host CPU and a Hexagon DSP (ADSP/SLPI). See `SPEC_FULL.md` for
//! the full module breakdown; each submodule below carries its own grounding
//! notes in `DESIGN.md`.

pub mod apps_std;
pub mod error;
pub mod flags;
pub mod hexagonfs;
pub mod interface;
pub mod invoke;
pub mod iobuf;
pub mod kernel;
pub mod listener;
pub mod localctl;
pub mod method;
pub mod session;
