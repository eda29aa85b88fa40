//! The registry mapping a remote-assigned handle to a named local interface
//! and its procedure table (spec §4.G), plus the declared shape of a single
//! procedure within an interface.
//!
//! Grounded on `fastrpc/hexagonrpcd/listener.c`'s `struct fastrpc_interface`
//! / `struct fastrpc_function_impl` (an array of `{def, impl}` pairs indexed
//! by method id, `NULL` entries meaning "not implemented") and
//! `localctl.c`'s `fastrpc_localctl_init`, which hands the same interface
//! array the listener dispatches through to the `remotectl` implementation
//! so it can search sibling interfaces by name.

use crate::iobuf::IoBuffer;
use crate::method::MethodDescriptor;

/// The declared shape of one procedure: how many scalar words and how many
/// standalone buffers it takes in each direction, per spec §3/§4.C. Distinct
/// from [`crate::method::MethodDescriptor`], which only carries the
/// *effective* wire-level buffer counts used to build or match a
/// [`crate::method::ScalarsWord`] — this type is the richer, declaration-time
/// shape a concrete interface is written against, and derives the effective
/// counts from it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProcSignature {
    pub method_id: u8,
    pub in_scalars: u8,
    pub in_buffers: u8,
    pub out_scalars: u8,
    pub out_buffers: u8,
}

impl ProcSignature {
    pub const fn new(method_id: u8, in_scalars: u8, in_buffers: u8, out_scalars: u8, out_buffers: u8) -> ProcSignature {
        ProcSignature { method_id, in_scalars, in_buffers, out_scalars, out_buffers }
    }

    /// First input scratch slot required whenever there is anything at all
    /// to describe in it (spec §3: "any of the four counts is nonzero").
    fn needs_input_scratch(self) -> bool {
        self.in_scalars > 0 || self.in_buffers > 0 || self.out_scalars > 0 || self.out_buffers > 0
    }

    fn needs_output_scratch(self) -> bool {
        self.out_scalars > 0
    }

    /// The effective wire-level buffer counts a [`crate::method::ScalarsWord`]
    /// for this procedure must carry.
    pub fn effective(self) -> MethodDescriptor {
        let in_bufs = self.needs_input_scratch() as u8 + self.in_buffers;
        let out_bufs = self.needs_output_scratch() as u8 + self.out_buffers;
        MethodDescriptor::new(self.method_id, in_bufs, out_bufs)
    }

    /// Byte size of the synthesized first input/output scratch buffers
    /// (`4 * (in_scalars + in_buffers + out_buffers)`, `4 * out_scalars`),
    /// zero when the corresponding scratch slot isn't needed.
    pub fn scratch_sizes(self) -> (usize, usize) {
        let in_scratch = if self.needs_input_scratch() {
            4 * (self.in_scalars as usize + self.in_buffers as usize + self.out_buffers as usize)
        } else {
            0
        };
        let out_scratch = if self.needs_output_scratch() { 4 * self.out_scalars as usize } else { 0 };
        (in_scratch, out_scratch)
    }
}

/// A concrete local interface: something the DSP can open by name through
/// `remotectl` and then invoke methods against over the reverse tunnel.
pub trait AppInterface {
    /// Declared shape of `method`, or `None` if the slot is unimplemented
    /// (spec §4.G: "empty entries are permitted and mean 'method not
    /// implemented'").
    fn signature(&self, method: u8) -> Option<ProcSignature>;

    /// Dispatches an already-validated call (the listener has confirmed the
    /// incoming scalars word matches `signature(method)`'s effective counts
    /// and that every inbuf size matches its declared length) and returns the
    /// AEE result word.
    fn call(&mut self, method: u8, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32;
}

struct Entry {
    name: &'static str,
    interface: Box<dyn AppInterface>,
}

/// Maps a remote-assigned handle (a small index, `0` reserved for
/// `remotectl`) to its name and implementation. Built once at startup;
/// interfaces are process-lifetime (spec §4.G/§4.I Non-goals).
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry { entries: Vec::new() }
    }

    /// Registers `interface` under `name`, returning its assigned handle.
    /// Handles are assigned sequentially starting at `0`; by convention the
    /// first registration is `remotectl` itself.
    pub fn register(&mut self, name: &'static str, interface: Box<dyn AppInterface>) -> u32 {
        self.entries.push(Entry { name, interface });
        (self.entries.len() - 1) as u32
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.entries.iter().position(|e| e.name == name).map(|i| i as u32)
    }

    pub fn name_of(&self, handle: u32) -> Option<&str> {
        self.entries.get(handle as usize).map(|e| e.name)
    }

    pub fn signature(&self, handle: u32, method: u8) -> Option<ProcSignature> {
        self.entries.get(handle as usize)?.interface.signature(method)
    }

    /// Dispatches a validated call to the interface at `handle`. Returns
    /// `None` if `handle` is out of range (the caller has already checked
    /// this via [`Registry::signature`] in practice).
    pub fn call(&mut self, handle: u32, method: u8, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> Option<u32> {
        Some(self.entries.get_mut(handle as usize)?.interface.call(method, inbufs, outbufs))
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}
