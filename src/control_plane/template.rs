//! Guest template creation payload (flat v3 format).

use serde::Serialize;

/// Flat QEMU template body.
///
/// Device class, console type and boot defaults are fixed; only the name,
/// disk image, memory and platform vary per image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QemuTemplate {
    name: String,
    default_name_format: &'static str,
    usage: &'static str,
    symbol: &'static str,
    category: &'static str,
    port_name_format: &'static str,
    port_segment_size: u32,
    first_port_name: &'static str,
    custom_adapters: Vec<serde_json::Value>,
    hda_disk_image: String,
    hdb_disk_image: &'static str,
    hdc_disk_image: &'static str,
    hdd_disk_image: &'static str,
    hda_disk_interface: &'static str,
    hdb_disk_interface: &'static str,
    hdc_disk_interface: &'static str,
    hdd_disk_interface: &'static str,
    cdrom_image: &'static str,
    bios_image: &'static str,
    boot_priority: &'static str,
    console_type: &'static str,
    console_auto_start: bool,
    aux_type: &'static str,
    ram: u32,
    cpus: u32,
    adapters: u32,
    adapter_type: &'static str,
    mac_address: &'static str,
    replicate_network_connection_state: bool,
    tpm: bool,
    uefi: bool,
    create_config_disk: bool,
    on_close: &'static str,
    platform: String,
    qemu_path: &'static str,
    cpu_throttling: u32,
    process_priority: &'static str,
    options: &'static str,
    kernel_image: &'static str,
    initrd: &'static str,
    kernel_command_line: &'static str,
    linked_clone: bool,
    compute_id: &'static str,
    template_type: &'static str,
}

impl QemuTemplate {
    /// Telnet-console guest template with one e1000 adapter booting from disk.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        disk_image: impl Into<String>,
        ram_mb: u32,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            default_name_format: "{name}-{0}",
            usage: "",
            symbol: "qemu_guest",
            category: "guest",
            port_name_format: "Ethernet{0}",
            port_segment_size: 0,
            first_port_name: "",
            custom_adapters: Vec::new(),
            hda_disk_image: disk_image.into(),
            hdb_disk_image: "",
            hdc_disk_image: "",
            hdd_disk_image: "",
            hda_disk_interface: "ide",
            hdb_disk_interface: "none",
            hdc_disk_interface: "none",
            hdd_disk_interface: "none",
            cdrom_image: "",
            bios_image: "",
            boot_priority: "c",
            console_type: "telnet",
            console_auto_start: false,
            aux_type: "none",
            ram: ram_mb,
            cpus: 1,
            adapters: 1,
            adapter_type: "e1000",
            mac_address: "",
            replicate_network_connection_state: true,
            tpm: false,
            uefi: false,
            create_config_disk: false,
            on_close: "power_off",
            platform: platform.into(),
            qemu_path: "",
            cpu_throttling: 0,
            process_priority: "normal",
            options: "",
            kernel_image: "",
            initrd: "",
            kernel_command_line: "",
            linked_clone: true,
            compute_id: "local",
            template_type: "qemu",
        }
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Disk image the template boots.
    #[must_use]
    pub fn disk_image(&self) -> &str {
        &self.hda_disk_image
    }

    /// Memory in MiB.
    #[must_use]
    pub const fn ram_mb(&self) -> u32 {
        self.ram
    }

    /// Emulation platform.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }
}
