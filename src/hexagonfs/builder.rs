//! Construction of the one [`Tree`] the daemon actually serves.
//!
//! Grounded on `hexagonrpcd/rpcd_builder.c`'s `construct_root_dir` for the
//! overall shape (a `prefix` directory standing in for `/var/lib/qcom` on
//! systems that relocate it, plus a DSP-named subdirectory of prebuilt
//! skeletons) and `hexagonrpcd/hexagonfs.c`'s hardcoded `hexagonfs_root_dir`
//! for the `/sys/devices/soc0` socinfo attributes, which `rpcd_builder.c`
//! doesn't build at all (they're wired up directly in the static tree
//! instead of the configurable one). Both are genuine shipped trees; this
//! builder produces their union so the daemon always exposes the socinfo
//! attributes regardless of which `prefix`/`dsp` it was launched with.

use std::path::Path;
use std::sync::Arc;

use super::tree::{NodeId, Tree};

const SOCINFO_DEBUGFS: &str = "/sys/kernel/debug/qcom_socinfo";
const SOCINFO_SYSFS: &str = "/sys/devices/soc0";

/// Builds the full root directory for `prefix` (the sensor-registry/ACDB
/// data root, `/var/lib/qcom` on most systems) and `dsp` (the subdirectory
/// of `prefix/dsp` holding this SoC's prebuilt DSP images, e.g. `"adsp"`).
/// Returns the tree and the id of its root node.
pub fn construct_root_dir(prefix: &Path, dsp: &str) -> (Arc<Tree>, NodeId) {
    let mut tree = Tree::new();

    let registry = tree.alloc_mapped("registry", prefix.join("sensors/registry"));
    let sensors_registry = tree.alloc_virt_dir("sensors");
    tree.link(sensors_registry, "registry", registry);

    // The same registry directory is reachable from both `/persist` and
    // `/mnt/vendor/persist`: some platforms read it from one path, some from
    // the other. `rpcd_builder.c` builds the `persist` subtree once and
    // wires the same dirent into the root twice; sharing `sensors_registry`
    // (and `registry` beneath it) here does the same without duplicating
    // the node.
    let persist = tree.alloc_virt_dir("persist");
    tree.link(persist, "sensors", sensors_registry);

    let mnt = tree.alloc_virt_dir("mnt");
    let mnt_vendor = tree.alloc_virt_dir("vendor");
    tree.link(mnt, "vendor", mnt_vendor);
    tree.link(mnt_vendor, "persist", persist);

    let usr = tree.alloc_virt_dir("usr");
    let usr_lib = tree.alloc_virt_dir("lib");
    let usr_lib_qcom = tree.alloc_virt_dir("qcom");
    let adsp = tree.alloc_mapped("adsp", prefix.join("dsp").join(dsp));
    tree.link(usr, "lib", usr_lib);
    tree.link(usr_lib, "qcom", usr_lib_qcom);
    tree.link(usr_lib_qcom, "adsp", adsp);

    let vendor = tree.alloc_virt_dir("vendor");
    let vendor_etc = tree.alloc_virt_dir("etc");
    let vendor_sensors = tree.alloc_virt_dir("sensors");
    let sensors_config = tree.alloc_mapped("config", prefix.join("sensors/config"));
    let sns_reg_config = tree.alloc_mapped("sns_reg_config", prefix.join("sensors/sns_reg.conf"));
    let acdbdata = tree.alloc_mapped("acdbdata", prefix.join("acdb"));
    tree.link(vendor, "etc", vendor_etc);
    tree.link(vendor_etc, "sensors", vendor_sensors);
    tree.link(vendor_sensors, "config", sensors_config);
    tree.link(vendor_sensors, "sns_reg_config", sns_reg_config);
    tree.link(vendor_etc, "acdbdata", acdbdata);

    let sys = tree.alloc_virt_dir("sys");
    let sys_devices = tree.alloc_virt_dir("devices");
    let soc0 = tree.alloc_virt_dir("soc0");
    let hw_platform = tree.alloc_sysfs_mapped(
        "hw_platform",
        Path::new(SOCINFO_DEBUGFS).join("hardware_platform"),
    );
    let platform_subtype = tree.alloc_missing_sysfs(
        "platform_subtype",
        Path::new(SOCINFO_DEBUGFS).join("hardware_platform_subtype"),
    );
    let platform_subtype_id = tree.alloc_sysfs_mapped(
        "platform_subtype_id",
        Path::new(SOCINFO_DEBUGFS).join("hardware_platform_subtype"),
    );
    let platform_version =
        tree.alloc_sysfs_mapped("platform_version", Path::new(SOCINFO_DEBUGFS).join("platform_version"));
    let revision = tree.alloc_sysfs_mapped("revision", Path::new(SOCINFO_SYSFS).join("revision"));
    let soc_id = tree.alloc_sysfs_mapped("soc_id", Path::new(SOCINFO_SYSFS).join("soc_id"));
    tree.link(sys, "devices", sys_devices);
    tree.link(sys_devices, "soc0", soc0);
    tree.link(soc0, "hw_platform", hw_platform);
    tree.link(soc0, "platform_subtype", platform_subtype);
    tree.link(soc0, "platform_subtype_id", platform_subtype_id);
    tree.link(soc0, "platform_version", platform_version);
    tree.link(soc0, "revision", revision);
    tree.link(soc0, "soc_id", soc_id);

    let root = tree.alloc_virt_dir("/");
    tree.link(root, "mnt", mnt);
    tree.link(root, "persist", persist);
    tree.link(root, "usr", usr);
    tree.link(root, "vendor", vendor);
    tree.link(root, "sys", sys);

    (Arc::new(tree), root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_and_mnt_vendor_persist_share_the_registry_node() {
        let (tree, root) = construct_root_dir(Path::new("/var/lib/qcom"), "adsp");

        let persist = tree.lookup(root, "persist").unwrap();
        let registry_a = tree.lookup(tree.lookup(persist, "sensors").unwrap(), "registry").unwrap();

        let mnt = tree.lookup(root, "mnt").unwrap();
        let mnt_vendor = tree.lookup(mnt, "vendor").unwrap();
        let mnt_persist = tree.lookup(mnt_vendor, "persist").unwrap();
        let registry_b = tree.lookup(tree.lookup(mnt_persist, "sensors").unwrap(), "registry").unwrap();

        assert_eq!(registry_a, registry_b);
    }

    #[test]
    fn adsp_library_path_is_prefix_dsp_joined() {
        let (tree, root) = construct_root_dir(Path::new("/var/lib/qcom"), "adsp");
        let adsp = tree.lookup(
            tree.lookup(tree.lookup(tree.lookup(root, "usr").unwrap(), "lib").unwrap(), "qcom").unwrap(),
            "adsp",
        );
        assert!(adsp.is_ok());
    }
}
