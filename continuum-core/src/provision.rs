//! First-boot provisioning payloads (cloud-init user data).
//!
//! The payload is a set of serde records rendered with `serde_yaml`; the
//! netplan file it drops into the guest is itself a YAML document rendered
//! the same way.

use crate::generate::{check_node_name, GenerateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Header line cloud-init requires on user data.
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Resolvers written into the guest network configuration.
pub const NAMESERVERS: [&str; 2] = ["1.1.1.1", "8.8.8.8"];

const CLOUD_NETWORK_FILE: &str = "/etc/cloud/cloud.cfg.d/99-custom-networking.cfg";
const NETPLAN_FILE: &str = "/etc/netplan/new-config.yaml";
const FINAL_MESSAGE: &str = "The system is finally up, after $UPTIME seconds";

/// Top-level `#cloud-config` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Guest hostname.
    pub hostname: String,
    /// Guest FQDN.
    pub fqdn: String,
    /// Let cloud-init manage `/etc/hosts`.
    pub manage_etc_hosts: bool,
    /// Accounts to create.
    pub users: Vec<CloudUser>,
    /// Allow SSH password authentication.
    pub ssh_pwauth: bool,
    /// Disable root login.
    pub disable_root: bool,
    /// Password assignments.
    pub chpasswd: Chpasswd,
    /// Files written before `runcmd`.
    pub write_files: Vec<WriteFile>,
    /// Commands run once at first boot.
    pub runcmd: Vec<String>,
    /// Logged when boot completes.
    pub final_message: String,
}

/// Admin account of a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUser {
    /// Login name.
    pub name: String,
    /// sudoers rule.
    pub sudo: String,
    /// Comma-separated supplementary groups.
    pub groups: String,
    /// Home directory.
    pub home: String,
    /// Login shell.
    pub shell: String,
    /// Keep the password usable.
    pub lock_passwd: bool,
    /// Authorized public keys.
    #[serde(rename = "ssh-authorized-keys")]
    pub ssh_authorized_keys: Vec<String>,
}

/// `chpasswd` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chpasswd {
    /// `user:password` lines.
    pub list: String,
    /// Force a password change at first login.
    pub expire: bool,
}

/// One `write_files` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFile {
    /// Absolute guest path.
    pub path: String,
    /// Octal mode.
    pub permissions: String,
    /// File content.
    pub content: String,
}

#[derive(Debug, Serialize)]
struct Netplan<'a> {
    network: NetplanNetwork<'a>,
}

#[derive(Debug, Serialize)]
struct NetplanNetwork<'a> {
    version: u8,
    ethernets: BTreeMap<&'a str, Ethernet>,
}

#[derive(Debug, Serialize)]
struct Ethernet {
    dhcp4: bool,
    addresses: Vec<String>,
    gateway4: String,
    nameservers: Nameservers,
}

#[derive(Debug, Serialize)]
struct Nameservers {
    addresses: Vec<&'static str>,
    search: Vec<String>,
}

/// Inputs of one VM's user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningPayload {
    name: String,
    ip: Ipv4Addr,
    gateway: Ipv4Addr,
    interface: String,
    ssh_key: String,
}

impl ProvisioningPayload {
    /// Validate and build a payload.
    pub fn new(
        name: impl Into<String>,
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: impl Into<String>,
        ssh_key: impl Into<String>,
    ) -> Result<Self, GenerateError> {
        let ssh_key = ssh_key.into().trim().to_string();
        if ssh_key.is_empty() {
            return Err(GenerateError::EmptySshKey);
        }
        Ok(Self {
            name: check_node_name(name.into())?,
            ip,
            gateway,
            interface: interface.into(),
            ssh_key,
        })
    }

    /// Guest hostname: the node name without `_` separators.
    pub fn hostname(&self) -> String {
        self.name.replace('_', "")
    }

    fn netplan(&self) -> Result<String, GenerateError> {
        let mut ethernets = BTreeMap::new();
        ethernets.insert(
            self.interface.as_str(),
            Ethernet {
                dhcp4: false,
                addresses: vec![format!("{}/16", self.ip)],
                gateway4: self.gateway.to_string(),
                nameservers: Nameservers {
                    addresses: NAMESERVERS.to_vec(),
                    search: Vec::new(),
                },
            },
        );
        let doc = Netplan {
            network: NetplanNetwork {
                version: 2,
                ethernets,
            },
        };
        Ok(serde_yaml::to_string(&doc)?)
    }

    /// Typed cloud-init document.
    pub fn cloud_config(&self) -> Result<CloudConfig, GenerateError> {
        let hostname = self.hostname();
        Ok(CloudConfig {
            fqdn: hostname.clone(),
            hostname,
            manage_etc_hosts: true,
            users: vec![CloudUser {
                name: self.name.clone(),
                sudo: "ALL=(ALL) NOPASSWD:ALL".to_string(),
                groups: "users, admin".to_string(),
                home: format!("/home/{}", self.name),
                shell: "/bin/bash".to_string(),
                lock_passwd: false,
                ssh_authorized_keys: vec![self.ssh_key.clone()],
            }],
            ssh_pwauth: false,
            disable_root: false,
            // Static placeholder password; SSH password login stays disabled.
            chpasswd: Chpasswd {
                list: format!("{}:password\n", self.name),
                expire: false,
            },
            write_files: vec![
                WriteFile {
                    path: CLOUD_NETWORK_FILE.to_string(),
                    permissions: "0644".to_string(),
                    content: "network: {config: disabled}\n".to_string(),
                },
                WriteFile {
                    path: NETPLAN_FILE.to_string(),
                    permissions: "0644".to_string(),
                    content: self.netplan()?,
                },
            ],
            runcmd: vec![
                "rm /etc/netplan/50-cloud-init.yaml".to_string(),
                "netplan generate".to_string(),
                "netplan apply".to_string(),
            ],
            final_message: FINAL_MESSAGE.to_string(),
        })
    }

    /// Render `user_data_<name>.yml`.
    pub fn to_cloud_config(&self) -> Result<String, GenerateError> {
        let body = serde_yaml::to_string(&self.cloud_config()?)?;
        Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
    }
}
