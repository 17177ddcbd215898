//! libvirt domain descriptors.
//!
//! A [`VirtualMachineSpec`] is a typed record of everything that varies
//! between VMs; [`VirtualMachineSpec::to_xml`] renders it through a small
//! element writer so escaping happens in one place.

use crate::generate::GenerateError;
use continuum_types::Architecture;
use std::borrow::Cow;

/// Memory granted per vCPU, in KiB (1 GiB).
pub const MEMORY_PER_CORE_KIB: u64 = 1_048_576;

/// CPU bandwidth scheduling period in microseconds.
pub const CPU_PERIOD: u32 = 100_000;

/// Quota for a fraction of the scheduling period, rounded down.
pub fn cpu_quota(fraction: f64) -> u32 {
    (f64::from(CPU_PERIOD) * fraction).floor() as u32
}

/// Boot firmware and guest NIC naming, chosen by host architecture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FirmwareProfile {
    /// BIOS boot, default machine type.
    #[default]
    Bios,
    /// UEFI boot on the `virt` machine with host CPU passthrough.
    ArmUefi,
}

impl FirmwareProfile {
    /// Profile for a physical machine's architecture.
    pub fn for_arch(arch: Architecture) -> Self {
        match arch {
            Architecture::Aarch64 => Self::ArmUefi,
            Architecture::X86_64 => Self::Bios,
        }
    }

    /// Name of the single guest network interface.
    pub fn interface(&self) -> &'static str {
        match self {
            Self::Bios => "ens2",
            Self::ArmUefi => "enp2s1",
        }
    }
}

/// One `<vcpupin>` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpuPin {
    /// Guest vCPU index.
    pub vcpu: u32,
    /// Physical core.
    pub cpuset: u32,
}

/// CPU bandwidth limits and optional static pinning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuTune {
    /// Scheduling period in microseconds.
    pub period: u32,
    /// Runtime allowed per period in microseconds.
    pub quota: u32,
    /// Pins in vCPU order; empty when pinning is off.
    pub pins: Vec<VcpuPin>,
}

/// Everything needed to render a `domain_<name>.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMachineSpec {
    name: String,
    memory_kib: u64,
    vcpus: u32,
    firmware: FirmwareProfile,
    cputune: Option<CpuTune>,
    bridge: String,
    image_dir: String,
}

impl VirtualMachineSpec {
    /// Validate and build a descriptor.
    pub fn new(
        name: impl Into<String>,
        vcpus: u32,
        firmware: FirmwareProfile,
        cputune: Option<CpuTune>,
        bridge: impl Into<String>,
        image_dir: impl Into<String>,
    ) -> Result<Self, GenerateError> {
        let name = crate::generate::check_node_name(name.into())?;
        let bridge = bridge.into();
        if bridge.trim().is_empty() {
            return Err(GenerateError::EmptyBridge);
        }
        Ok(Self {
            name,
            memory_kib: u64::from(vcpus) * MEMORY_PER_CORE_KIB,
            vcpus,
            firmware,
            cputune,
            bridge,
            image_dir: image_dir.into(),
        })
    }

    /// Domain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Memory in KiB.
    pub fn memory_kib(&self) -> u64 {
        self.memory_kib
    }

    /// vCPU count.
    pub fn vcpus(&self) -> u32 {
        self.vcpus
    }

    /// CPU tuning block, absent for base images.
    pub fn cputune(&self) -> Option<&CpuTune> {
        self.cputune.as_ref()
    }

    fn image(&self, file: &str) -> String {
        format!("{}/{}", self.image_dir.trim_end_matches('/'), file)
    }

    fn element(&self) -> Element {
        let arm = self.firmware == FirmwareProfile::ArmUefi;

        let mut os_type = Element::new("type").text("hvm");
        let mut os = Element::new("os");
        if arm {
            os = os.attr("firmware", "efi");
            os_type = os_type.attr("arch", "aarch64").attr("machine", "virt");
        }
        os = os
            .child(os_type)
            .child(Element::new("boot").attr("dev", "hd"));
        if arm {
            os = os.child(
                Element::new("loader")
                    .attr("readonly", "yes")
                    .attr("secure", "no"),
            );
        }

        let mut domain = Element::new("domain")
            .attr("type", "kvm")
            .child(Element::new("name").text(&self.name))
            .child(Element::new("memory").text(self.memory_kib.to_string()))
            .child(os)
            .child(Element::new("features").child(Element::new("acpi")))
            .child(
                Element::new("vcpu")
                    .attr("placement", "static")
                    .text(self.vcpus.to_string()),
            );
        if arm {
            domain = domain.child(Element::new("cpu").attr("mode", "host-passthrough"));
        }
        if let Some(tune) = &self.cputune {
            let mut cputune = Element::new("cputune")
                .child(Element::new("period").text(tune.period.to_string()))
                .child(Element::new("quota").text(tune.quota.to_string()));
            for pin in &tune.pins {
                cputune = cputune.child(
                    Element::new("vcpupin")
                        .attr("vcpu", pin.vcpu.to_string())
                        .attr("cpuset", pin.cpuset.to_string()),
                );
            }
            domain = domain.child(cputune);
        }

        let devices = Element::new("devices")
            .child(
                Element::new("interface")
                    .attr("type", "bridge")
                    .child(Element::new("source").attr("bridge", &self.bridge))
                    .child(Element::new("model").attr("type", "e1000")),
            )
            .child(
                Element::new("disk")
                    .attr("type", "file")
                    .attr("device", "disk")
                    .child(
                        Element::new("driver")
                            .attr("type", "qcow2")
                            .attr("cache", "none"),
                    )
                    .child(
                        Element::new("source")
                            .attr("file", self.image(&format!("{}.qcow2", self.name))),
                    )
                    .child(Element::new("target").attr("dev", "vda").attr("bus", "virtio")),
            )
            .child(
                Element::new("disk")
                    .attr("type", "file")
                    .attr("device", "disk")
                    .child(
                        Element::new("source")
                            .attr("file", self.image(&format!("user_data_{}.img", self.name))),
                    )
                    .child(Element::new("target").attr("dev", "vdb").attr("bus", "virtio")),
            )
            .child(
                Element::new("console").attr("type", "pty").child(
                    Element::new("target")
                        .attr("type", "serial")
                        .attr("port", "1"),
                ),
            );

        domain.child(devices)
    }

    /// Render the libvirt domain XML.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.element().write(&mut out, 0);
        out
    }
}

/// Minimal XML element tree.
#[derive(Debug, Clone)]
struct Element {
    name: &'static str,
    attrs: Vec<(&'static str, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn write(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(self.name);
        for (key, value) in &self.attrs {
            out.push_str(&format!(" {key}='{}'", escape(value)));
        }

        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                out.push_str(&format!(">{}</{}>\n", escape(text), self.name));
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    out.push_str(&format!("{indent}    {}\n", escape(text)));
                }
                for child in &self.children {
                    child.write(out, depth + 1);
                }
                out.push_str(&format!("{indent}</{}>\n", self.name));
            }
        }
    }
}

fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '\'', '"']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(firmware: FirmwareProfile, cputune: Option<CpuTune>) -> VirtualMachineSpec {
        VirtualMachineSpec::new("cloud0", 2, firmware, cputune, "br0", "/var/lib/libvirt/images/")
            .unwrap()
    }

    fn pinned() -> CpuTune {
        CpuTune {
            period: CPU_PERIOD,
            quota: cpu_quota(0.5),
            pins: vec![
                VcpuPin { vcpu: 0, cpuset: 4 },
                VcpuPin { vcpu: 1, cpuset: 5 },
            ],
        }
    }

    #[test]
    fn memory_scales_with_cores() {
        assert_eq!(spec(FirmwareProfile::Bios, None).memory_kib(), 2_097_152);
    }

    #[test]
    fn quota_rounds_down() {
        assert_eq!(cpu_quota(1.0), 100_000);
        assert_eq!(cpu_quota(0.5), 50_000);
        assert_eq!(cpu_quota(0.333333), 33_333);
    }

    #[test]
    fn bios_domain_layout() {
        let xml = spec(FirmwareProfile::Bios, Some(pinned())).to_xml();
        assert!(xml.starts_with("<domain type='kvm'>\n    <name>cloud0</name>\n"));
        assert!(xml.contains("<memory>2097152</memory>"));
        assert!(xml.contains("        <type>hvm</type>\n"));
        assert!(xml.contains("<vcpu placement='static'>2</vcpu>"));
        assert!(xml.contains("<period>100000</period>"));
        assert!(xml.contains("<quota>50000</quota>"));
        assert!(xml.contains(
            "        <vcpupin vcpu='0' cpuset='4'/>\n        <vcpupin vcpu='1' cpuset='5'/>\n"
        ));
        assert!(xml.contains("<source bridge='br0'/>"));
        assert!(xml.contains("<model type='e1000'/>"));
        assert!(xml.contains("<source file='/var/lib/libvirt/images/cloud0.qcow2'/>"));
        assert!(xml.contains("<source file='/var/lib/libvirt/images/user_data_cloud0.img'/>"));
        assert!(xml.contains("<target type='serial' port='1'/>"));
        assert!(!xml.contains("firmware"));
        assert!(!xml.contains("loader"));
        assert!(!xml.contains("host-passthrough"));
        assert!(xml.ends_with("</domain>\n"));
    }

    #[test]
    fn arm_domain_uses_uefi() {
        let xml = spec(FirmwareProfile::ArmUefi, None).to_xml();
        assert!(xml.contains("<os firmware='efi'>"));
        assert!(xml.contains("<type arch='aarch64' machine='virt'>hvm</type>"));
        assert!(xml.contains("<loader readonly='yes' secure='no'/>"));
        assert!(xml.contains("<cpu mode='host-passthrough'/>"));
    }

    #[test]
    fn base_image_has_no_cputune() {
        let xml = spec(FirmwareProfile::Bios, None).to_xml();
        assert!(!xml.contains("cputune"));
    }

    #[test]
    fn profile_per_architecture() {
        assert_eq!(
            FirmwareProfile::for_arch(Architecture::Aarch64).interface(),
            "enp2s1"
        );
        assert_eq!(FirmwareProfile::for_arch(Architecture::X86_64).interface(), "ens2");
    }

    #[test]
    fn rejects_empty_bridge_and_name() {
        assert!(matches!(
            VirtualMachineSpec::new("edge0", 1, FirmwareProfile::Bios, None, " ", "/img"),
            Err(GenerateError::EmptyBridge)
        ));
        assert!(matches!(
            VirtualMachineSpec::new("", 1, FirmwareProfile::Bios, None, "br0", "/img"),
            Err(GenerateError::EmptyNodeName)
        ));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let vm = VirtualMachineSpec::new("edge0", 1, FirmwareProfile::Bios, None, "br'<0>", "/img")
            .unwrap();
        assert!(vm.to_xml().contains("<source bridge='br&apos;&lt;0&gt;'/>"));
        assert_eq!(escape("plain"), Cow::Borrowed("plain"));
    }
}
