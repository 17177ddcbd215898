//! Tiers, deployment modes and the enumerated experiment options.
//!
//! Every enumeration here has a fixed textual form that is used verbatim in
//! experiment files, artifact names and log output.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed enumeration with a canonical lowercase spelling.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical spelling used in configuration files.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(TypesError::unknown($kind, other)),
                }
            }
        }
    };
}

text_enum! {
    /// Position of a node in the compute continuum.
    Tier, "tier" {
        /// Datacenter-class node.
        Cloud => "cloud",
        /// Node close to the data source.
        Edge => "edge",
        /// Device producing the data.
        Endpoint => "endpoint",
    }
}

text_enum! {
    /// Deployment mode of a benchmark.
    ///
    /// Never configured freely: it is implied by the node counts, see
    /// [`DeploymentMode::infer`].
    DeploymentMode, "deployment mode" {
        /// Endpoints offload to cloud workers.
        Cloud => "cloud",
        /// Endpoints offload to edge workers.
        Edge => "edge",
        /// Endpoints process everything locally.
        Endpoint => "endpoint",
    }
}

impl DeploymentMode {
    /// Derive the mode from node counts.
    ///
    /// Any edge node makes it an edge deployment; otherwise any cloud node
    /// makes it a cloud deployment; otherwise it is endpoint-only.
    pub fn infer(cloud_nodes: u32, edge_nodes: u32) -> Self {
        if edge_nodes > 0 {
            Self::Edge
        } else if cloud_nodes > 0 {
            Self::Cloud
        } else {
            Self::Endpoint
        }
    }
}

text_enum! {
    /// Virtualization provider used to create the VMs.
    Provider, "provider" {
        /// QEMU/KVM through libvirt.
        Qemu => "qemu",
    }
}

text_enum! {
    /// Resource manager deployed on the cloud tier.
    CloudManager, "cloud resource manager" {
        /// Kubernetes control plane with cloud workers.
        Kubernetes => "kubernetes",
    }
}

text_enum! {
    /// Resource manager deployed on the edge tier.
    EdgeManager, "edge resource manager" {
        /// KubeEdge with a cloud-side controller.
        KubeEdge => "kubeedge",
    }
}

text_enum! {
    /// Benchmark application.
    Application, "application" {
        /// Publisher/subscriber image classification pipeline.
        ImageClassification => "image_classification",
    }
}

text_enum! {
    /// Wireless link preset for endpoint connections.
    NetworkPreset, "network preset" {
        /// LTE-like latency and throughput.
        FourG => "4g",
        /// 5G-like latency and throughput.
        FiveG => "5g",
    }
}
