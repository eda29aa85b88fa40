//! The static node tree HexagonFS resolves paths against: an arena of
//! directory entries indexed by [`NodeId`], letting one node (the sensor
//! registry, in particular) be reachable under more than one path without
//! being duplicated.
//!
//! Grounded on `hexagonrpcd/hexagonfs.h`'s `struct hexagonfs_dirent` (a name,
//! an ops table, and a union of either a child-dirent list or a physical
//! path) and the `DEFINE_VIRT_DIR`/`DEFINE_MAPPED`/`DEFINE_SYSFILE` macros in
//! `hexagonrpcd/hexagonfs.c` that build the literal tree from those. The C
//! tree is a graph of individually `malloc`'d dirents linked by raw
//! pointers — the same `registry` dirent pointer genuinely appears twice in
//! `hexagonfs_root_dir`. The arena plus index here gets the same sharing
//! without pointer aliasing.

use std::path::PathBuf;

use super::Error;

/// Index into a [`Tree`]'s arena. `Copy` because the same node is often
/// reached through more than one parent.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// An in-memory directory listing with no host-filesystem backing.
    /// Grounded on `hexagonfs_virt_dir_ops`: read-only stat, no readdir,
    /// read or seek.
    Virt { children: Vec<(String, NodeId)> },
    /// A file or directory backed 1:1 by a host path. Grounded on
    /// `hexagonfs_mapped_ops`.
    Mapped { host_path: PathBuf },
    /// Like `Mapped`, but `stat` reports a fixed 256-byte size for regular
    /// files. Grounded on `hexagonfs_mapped_sysfs_ops`'s workaround for
    /// sysfs attributes that don't report their own size through `stat(2)`.
    SysfsMapped { host_path: PathBuf },
    /// A sysfs-backed file whose host path may not exist on every kernel
    /// (the debugfs socinfo nodes this models are a downstream addition).
    /// Grounded on `hexagonfs_plat_subtype_name_ops`, generalized to
    /// tolerate the missing-file case rather than failing the whole open.
    MissingSysfs { host_path: PathBuf },
}

struct Node {
    name: String,
    kind: NodeKind,
}

/// Arena of every node in the filesystem, built once at startup by
/// [`crate::hexagonfs::builder::construct_root_dir`] and shared read-only
/// for the life of the daemon.
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree { nodes: Vec::new() }
    }

    fn alloc(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { name: name.into(), kind });
        NodeId(self.nodes.len() - 1)
    }

    pub fn alloc_virt_dir(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(name, NodeKind::Virt { children: Vec::new() })
    }

    pub fn alloc_mapped(&mut self, name: impl Into<String>, host_path: PathBuf) -> NodeId {
        self.alloc(name, NodeKind::Mapped { host_path })
    }

    pub fn alloc_sysfs_mapped(&mut self, name: impl Into<String>, host_path: PathBuf) -> NodeId {
        self.alloc(name, NodeKind::SysfsMapped { host_path })
    }

    pub fn alloc_missing_sysfs(&mut self, name: impl Into<String>, host_path: PathBuf) -> NodeId {
        self.alloc(name, NodeKind::MissingSysfs { host_path })
    }

    /// Adds `child` under `parent`'s listing. `parent` must be a `Virt`
    /// node. The same `child` id may be linked under more than one parent,
    /// reproducing the C tree's dirent-pointer sharing (the sensor registry
    /// appears at both `/persist/...` and `/mnt/vendor/persist/...`).
    pub fn link(&mut self, parent: NodeId, name: impl Into<String>, child: NodeId) {
        match &mut self.nodes[parent.0].kind {
            NodeKind::Virt { children } => children.push((name.into(), child)),
            _ => panic!("hexagonfs::Tree::link: parent is not a directory"),
        }
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Looks up `segment` among `id`'s children. `id` must name a `Virt`
    /// node; callers only reach here while still walking statically-known
    /// directories; a `Mapped` directory's children are resolved against the
    /// host filesystem instead, never through the tree.
    pub fn lookup(&self, id: NodeId, segment: &str) -> Result<NodeId, Error> {
        match &self.nodes[id.0].kind {
            NodeKind::Virt { children } => {
                children.iter().find(|(name, _)| name == segment).map(|(_, id)| *id).ok_or(Error::NotFound)
            }
            _ => Err(Error::NotADirectory),
        }
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_node_can_be_linked_under_two_parents() {
        let mut tree = Tree::new();
        let registry = tree.alloc_mapped("registry", PathBuf::from("/var/lib/qcom/sensors"));
        let persist = tree.alloc_virt_dir("persist");
        let mnt_persist = tree.alloc_virt_dir("persist");
        tree.link(persist, "registry", registry);
        tree.link(mnt_persist, "registry", registry);

        assert_eq!(tree.lookup(persist, "registry").unwrap(), registry);
        assert_eq!(tree.lookup(mnt_persist, "registry").unwrap(), registry);
    }

    #[test]
    fn lookup_on_a_mapped_node_is_not_a_directory() {
        let mut tree = Tree::new();
        let mapped = tree.alloc_mapped("adsp", PathBuf::from("/usr/lib/qcom/adsp"));
        assert!(matches!(tree.lookup(mapped, "whatever"), Err(Error::NotADirectory)));
    }

    #[test]
    fn lookup_of_missing_child_is_not_found() {
        let mut tree = Tree::new();
        let dir = tree.alloc_virt_dir("sys");
        assert!(matches!(tree.lookup(dir, "nope"), Err(Error::NotFound)));
    }
}
