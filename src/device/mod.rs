//! Device identity
//!
//! The host runtime introspects a device and hands the generator a
//! [`DeviceDescriptor`]. Every field is a lookup key into the profile
//! store, so all of them are ordered and hashable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error for identifiers that do not name a known key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {what} `{value}`")]
pub struct ParseKeyError {
    pub what: &'static str,
    pub value: String,
}

impl ParseKeyError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// PCI vendor id as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "VendorSpec", into = "VendorSpec")]
pub struct VendorId(pub u32);

impl VendorId {
    pub const UNKNOWN: VendorId = VendorId(0);
    pub const AMD: VendorId = VendorId(4098);
    pub const NVIDIA: VendorId = VendorId(4318);
    pub const INTEL: VendorId = VendorId(32902);

    /// Well-known name, if any
    pub fn known_name(self) -> Option<&'static str> {
        match self {
            VendorId::UNKNOWN => Some("unknown"),
            VendorId::AMD => Some("amd"),
            VendorId::NVIDIA => Some("nvidia"),
            VendorId::INTEL => Some("intel"),
            _ => None,
        }
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for VendorId {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" | "" => Ok(VendorId::UNKNOWN),
            "amd" | "advanced micro devices, inc." => Ok(VendorId::AMD),
            "nvidia" | "nvidia corporation" => Ok(VendorId::NVIDIA),
            "intel" | "intel(r) corporation" => Ok(VendorId::INTEL),
            other => other
                .parse::<u32>()
                .map(VendorId)
                .map_err(|_| ParseKeyError::new("vendor", s)),
        }
    }
}

/// Serialized form of a vendor: a name or a raw id
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VendorSpec {
    Id(u32),
    Name(String),
}

impl TryFrom<VendorSpec> for VendorId {
    type Error = ParseKeyError;

    fn try_from(spec: VendorSpec) -> Result<Self, Self::Error> {
        match spec {
            VendorSpec::Id(id) => Ok(VendorId(id)),
            VendorSpec::Name(name) => name.parse(),
        }
    }
}

impl From<VendorId> for VendorSpec {
    fn from(id: VendorId) -> Self {
        match id.known_name() {
            Some(name) => VendorSpec::Name(name.to_string()),
            None => VendorSpec::Id(id.0),
        }
    }
}

/// Device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Gpu,
    Cpu,
    Accelerator,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [DeviceClass::Gpu, DeviceClass::Cpu, DeviceClass::Accelerator];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Gpu => write!(f, "gpu"),
            DeviceClass::Cpu => write!(f, "cpu"),
            DeviceClass::Accelerator => write!(f, "accelerator"),
        }
    }
}

impl FromStr for DeviceClass {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(DeviceClass::Gpu),
            "cpu" => Ok(DeviceClass::Cpu),
            "accelerator" | "acc" => Ok(DeviceClass::Accelerator),
            _ => Err(ParseKeyError::new("device class", s)),
        }
    }
}

/// Vendor micro-architecture family
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    Unknown,
    // NVIDIA
    Tesla,
    Fermi,
    Kepler,
    Maxwell,
    // AMD
    Evergreen,
    NorthernIslands,
    SouthernIslands,
    VolcanicIslands,
}

impl Architecture {
    /// Guess the family from the device name reported by the runtime.
    pub fn detect(vendor: VendorId, name: &str) -> Architecture {
        match vendor {
            VendorId::NVIDIA => detect_nvidia(name),
            VendorId::AMD => detect_amd(name),
            _ => Architecture::Unknown,
        }
    }
}

/// Family from a marketing name.
///
/// Covers the generations with builtin tuning: GeForce 8000/9000 and
/// 200 to 900 series plus Tesla K/M boards. Four-digit models from the
/// 1000 series on, and anything without a model number, are `Unknown`
/// and resolve through the global defaults.
fn detect_nvidia(name: &str) -> Architecture {
    // Tesla compute boards carry the family letter in the model: K20, M40
    for word in name.split_whitespace() {
        let mut chars = word.chars();
        let (Some(prefix), Some(next)) = (chars.next(), chars.next()) else {
            continue;
        };
        if next.is_ascii_digit() {
            match prefix {
                'K' => return Architecture::Kepler,
                'M' => return Architecture::Maxwell,
                _ => {}
            }
        }
    }

    let Some(model) = name
        .split(|c: char| !c.is_ascii_digit())
        .filter(|digits| digits.len() >= 3)
        .find_map(|digits| digits.parse::<u32>().ok())
    else {
        return Architecture::Unknown;
    };

    match model {
        8000..=9999 => Architecture::Tesla,
        200..=399 => Architecture::Tesla,
        400..=599 => Architecture::Fermi,
        // GM107 parts inside the 700 series
        745 | 750 => Architecture::Maxwell,
        600..=799 => Architecture::Kepler,
        900..=999 => Architecture::Maxwell,
        _ => Architecture::Unknown,
    }
}

fn detect_amd(name: &str) -> Architecture {
    let lower = name.to_ascii_lowercase();
    let families: [(&[&str], Architecture); 4] = [
        (
            &["cypress", "hemlock", "juniper", "redwood", "cedar"],
            Architecture::Evergreen,
        ),
        (
            &["cayman", "barts", "turks", "caicos"],
            Architecture::NorthernIslands,
        ),
        (
            &["tahiti", "pitcairn", "cape verde", "capeverde", "oland"],
            Architecture::SouthernIslands,
        ),
        (
            &["tonga", "fiji", "iceland", "carrizo"],
            Architecture::VolcanicIslands,
        ),
    ];
    families
        .iter()
        .find(|(codenames, _)| codenames.iter().any(|c| lower.contains(c)))
        .map(|(_, arch)| *arch)
        .unwrap_or(Architecture::Unknown)
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::Unknown => "unknown",
            Architecture::Tesla => "tesla",
            Architecture::Fermi => "fermi",
            Architecture::Kepler => "kepler",
            Architecture::Maxwell => "maxwell",
            Architecture::Evergreen => "evergreen",
            Architecture::NorthernIslands => "northern_islands",
            Architecture::SouthernIslands => "southern_islands",
            Architecture::VolcanicIslands => "volcanic_islands",
        };
        f.write_str(name)
    }
}

impl FromStr for Architecture {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "unknown" | "" => Ok(Architecture::Unknown),
            "tesla" => Ok(Architecture::Tesla),
            "fermi" => Ok(Architecture::Fermi),
            "kepler" => Ok(Architecture::Kepler),
            "maxwell" => Ok(Architecture::Maxwell),
            "evergreen" => Ok(Architecture::Evergreen),
            "northern_islands" => Ok(Architecture::NorthernIslands),
            "southern_islands" => Ok(Architecture::SouthernIslands),
            "volcanic_islands" => Ok(Architecture::VolcanicIslands),
            _ => Err(ParseKeyError::new("architecture", s)),
        }
    }
}

/// Element type of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl NumericType {
    pub const ALL: [NumericType; 6] = [
        NumericType::Int,
        NumericType::UInt,
        NumericType::Long,
        NumericType::ULong,
        NumericType::Float,
        NumericType::Double,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Kernel-language spelling
    pub fn cl_name(self) -> &'static str {
        match self {
            NumericType::Int => "int",
            NumericType::UInt => "uint",
            NumericType::Long => "long",
            NumericType::ULong => "ulong",
            NumericType::Float => "float",
            NumericType::Double => "double",
        }
    }

    /// Size in bytes
    pub fn size_of(self) -> u64 {
        match self {
            NumericType::Int | NumericType::UInt | NumericType::Float => 4,
            NumericType::Long | NumericType::ULong | NumericType::Double => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericType::Float | NumericType::Double)
    }

    /// Vector type name (`float4`), `None` for widths the language lacks
    pub fn vector_name(self, width: u32) -> Option<String> {
        match width {
            1 => Some(self.cl_name().to_string()),
            2 | 4 | 8 | 16 => Some(format!("{}{}", self.cl_name(), width)),
            _ => None,
        }
    }

    /// Smallest representable value, the identity of `max`
    pub fn lowest(self) -> &'static str {
        match self {
            NumericType::Int => "INT_MIN",
            NumericType::UInt | NumericType::ULong => "0",
            NumericType::Long => "LONG_MIN",
            NumericType::Float | NumericType::Double => "-INFINITY",
        }
    }

    /// Largest representable value, the identity of `min`
    pub fn highest(self) -> &'static str {
        match self {
            NumericType::Int => "INT_MAX",
            NumericType::UInt => "UINT_MAX",
            NumericType::Long => "LONG_MAX",
            NumericType::ULong => "ULONG_MAX",
            NumericType::Float | NumericType::Double => "INFINITY",
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cl_name())
    }
}

impl FromStr for NumericType {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "i32" => Ok(NumericType::Int),
            "uint" | "u32" => Ok(NumericType::UInt),
            "long" | "i64" => Ok(NumericType::Long),
            "ulong" | "u64" => Ok(NumericType::ULong),
            "float" | "f32" => Ok(NumericType::Float),
            "double" | "f64" => Ok(NumericType::Double),
            _ => Err(ParseKeyError::new("numeric type", s)),
        }
    }
}

/// Execution target of an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub vendor: VendorId,
    pub class: DeviceClass,
    pub architecture: Architecture,
    /// Exact model name, empty when unknown
    pub name: String,
    pub numeric_type: NumericType,
}

impl DeviceDescriptor {
    pub fn new(vendor: VendorId, class: DeviceClass, numeric_type: NumericType) -> Self {
        Self {
            vendor,
            class,
            architecture: Architecture::Unknown,
            name: String::new(),
            numeric_type,
        }
    }

    /// A device nothing is known about
    pub fn unknown(class: DeviceClass, numeric_type: NumericType) -> Self {
        Self::new(VendorId::UNKNOWN, class, numeric_type)
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_numeric_type(mut self, numeric_type: NumericType) -> Self {
        self.numeric_type = numeric_type;
        self
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{:?}/{}",
            self.vendor, self.class, self.architecture, self.name, self.numeric_type
        )
    }
}

/// Hardware limits a launch must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_work_group_size: u32,
    pub local_mem_bytes: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        // OpenCL 1.2 minimums for non-custom devices
        Self {
            max_work_group_size: 256,
            local_mem_bytes: 32 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_parse() {
        assert_eq!("nvidia".parse::<VendorId>(), Ok(VendorId::NVIDIA));
        assert_eq!("NVIDIA Corporation".parse::<VendorId>(), Ok(VendorId::NVIDIA));
        assert_eq!("4098".parse::<VendorId>(), Ok(VendorId::AMD));
        assert_eq!("12345".parse::<VendorId>(), Ok(VendorId(12345)));
        assert!("acme".parse::<VendorId>().is_err());
    }

    #[test]
    fn test_vendor_display() {
        assert_eq!(VendorId::INTEL.to_string(), "intel");
        assert_eq!(VendorId(7).to_string(), "7");
    }

    #[test]
    fn test_detect_nvidia() {
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GTX 580"),
            Architecture::Fermi
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GTX 780 Ti"),
            Architecture::Kepler
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "Tesla K20m"),
            Architecture::Kepler
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GTX 980"),
            Architecture::Maxwell
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GTX 750 Ti"),
            Architecture::Maxwell
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GT 740"),
            Architecture::Kepler
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "GeForce GTX 1080"),
            Architecture::Unknown
        );
        assert_eq!(
            Architecture::detect(VendorId::NVIDIA, "Some Board"),
            Architecture::Unknown
        );
    }

    #[test]
    fn test_detect_amd() {
        assert_eq!(Architecture::detect(VendorId::AMD, "Tahiti"), Architecture::SouthernIslands);
        assert_eq!(Architecture::detect(VendorId::AMD, "Cypress"), Architecture::Evergreen);
        assert_eq!(Architecture::detect(VendorId::AMD, "Fiji"), Architecture::VolcanicIslands);
        assert_eq!(Architecture::detect(VendorId::INTEL, "Tahiti"), Architecture::Unknown);
    }

    #[test]
    fn test_numeric_type_names() {
        assert_eq!(NumericType::Float.vector_name(4).as_deref(), Some("float4"));
        assert_eq!(NumericType::Double.vector_name(1).as_deref(), Some("double"));
        assert_eq!(NumericType::Int.vector_name(5), None);
        assert_eq!(NumericType::Float.vector_name(3), None);
        assert_eq!(NumericType::ULong.size_of(), 8);
        assert_eq!("f32".parse::<NumericType>(), Ok(NumericType::Float));
    }

    #[test]
    fn test_vendor_serde() {
        let id: VendorId = serde_json::from_str("\"amd\"").expect("name");
        assert_eq!(id, VendorId::AMD);
        let id: VendorId = serde_json::from_str("99").expect("number");
        assert_eq!(id, VendorId(99));
        assert_eq!(serde_json::to_string(&VendorId::NVIDIA).expect("ser"), "\"nvidia\"");
    }
}
