//! Profile override loading

use devkern::device::{Architecture, DeviceClass, DeviceDescriptor, NumericType, VendorId};
use devkern::profiles::{
    MatrixProductParams, ProfileTable, ProfilesConfig, ResolvedFrom, VectorAxpyParams,
};
use devkern::{load_profiles, ConfigError};
use pretty_assertions::assert_eq;

const OVERRIDES: &str = r#"
[[vector_axpy]]
vendor = "nvidia"
class = "gpu"
architecture = "kepler"
numeric_type = "float"
params = { simd_width = 4, local_size_0 = 256, num_groups = 512, strided = true }

[[vector_axpy]]
vendor = "nvidia"
class = "gpu"
architecture = "kepler"
name = "Tesla K20m"
numeric_type = "float"
params = { simd_width = 2, local_size_0 = 512, num_groups = 1024, strided = false }

[[matrix_product_nn]]
vendor = "unknown"
class = "cpu"
numeric_type = "double"

[matrix_product_nn.params]
simd_width = 1
local_size_0 = 4
kl = 8
local_size_1 = 4
ms = 2
ks = 2
ns = 2
use_lhs_local = false
use_rhs_local = false
local_fetch_0 = 4
local_fetch_1 = 4
"#;

fn kepler(name: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::Kepler)
        .with_name(name)
}

#[test]
fn test_overrides_extend_builtin_tables() {
    let config = ProfilesConfig::from_toml_str(OVERRIDES).expect("valid overrides");
    assert_eq!(config.len(), 3);
    let profiles = load_profiles(Some(config)).expect("tables stay complete");

    assert_eq!(
        profiles.vector_axpy.resolve_with_source(&kepler("GeForce GTX 780")),
        (
            &VectorAxpyParams::new(4, 256, 512, true),
            ResolvedFrom::ArchitectureDefault
        )
    );
    assert_eq!(
        profiles.vector_axpy.resolve_with_source(&kepler("Tesla K20m")),
        (&VectorAxpyParams::new(2, 512, 1024, false), ResolvedFrom::Exact)
    );

    // Builtin Fermi tuning is untouched
    let fermi = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::Fermi);
    assert_eq!(
        profiles.vector_axpy.resolve(&fermi),
        &VectorAxpyParams::new(1, 1024, 2048, true)
    );
}

#[test]
fn test_overrides_replace_global_defaults() {
    let config = ProfilesConfig::from_toml_str(OVERRIDES).expect("valid overrides");
    let profiles = load_profiles(Some(config)).expect("tables stay complete");

    let cpu = DeviceDescriptor::new(VendorId(0x1234), DeviceClass::Cpu, NumericType::Double);
    assert_eq!(
        profiles.matrix_product_nn.resolve(&cpu),
        &MatrixProductParams::new(1, 4, 8, 4, 2, 2, 2, false, false, 4, 4)
    );
    let single = cpu.clone().with_numeric_type(NumericType::Float);
    let builtin = load_profiles(None).expect("builtin database is complete");
    assert_eq!(
        profiles.matrix_product_nn.resolve(&single),
        builtin.matrix_product_nn.resolve(&single)
    );
}

#[test]
fn test_overrides_show_in_listing() {
    let config = ProfilesConfig::from_toml_str(OVERRIDES).expect("valid overrides");
    let profiles = load_profiles(Some(config)).expect("tables stay complete");
    let builtin = load_profiles(None).expect("builtin database is complete");

    assert_eq!(
        profiles.listing(ProfileTable::VectorAxpy).len(),
        builtin.listing(ProfileTable::VectorAxpy).len() + 2
    );
    let listed = profiles
        .listing(ProfileTable::VectorAxpy)
        .into_iter()
        .any(|(key, params)| key.name == "Tesla K20m" && params.starts_with("V2L512G1024C"));
    assert!(listed);
}

#[test]
fn test_invalid_record_is_rejected() {
    let source = r#"
        [[reduction]]
        vendor = "amd"
        class = "gpu"
        numeric_type = "float"
        params = { simd_width = 5, local_size_0 = 128, num_groups = 64, strided = true }
    "#;
    match ProfilesConfig::from_toml_str(source) {
        Err(ConfigError::InvalidParams { table, key, reason }) => {
            assert_eq!(table, "reduction");
            assert_eq!(key, "amd/gpu/unknown/\"\"/float");
            assert!(reason.contains("simd_width"));
        }
        other => panic!("expected InvalidParams, got {:?}", other),
    }
}

#[test]
fn test_fetch_shape_is_validated() {
    let source = r#"
        [[matrix_product_tn]]
        vendor = "nvidia"
        class = "gpu"
        architecture = "fermi"
        numeric_type = "float"
        params = { simd_width = 1, local_size_0 = 16, kl = 16, local_size_1 = 16, ms = 4, ks = 4, ns = 4, use_lhs_local = true, use_rhs_local = true, local_fetch_0 = 8, local_fetch_1 = 8 }
    "#;
    assert!(matches!(
        ProfilesConfig::from_toml_str(source),
        Err(ConfigError::InvalidParams { table: "matrix_product_tn", .. })
    ));
}

#[test]
fn test_unknown_fields_are_rejected() {
    let unknown_table = r#"
        [[gemm]]
        vendor = "amd"
        class = "gpu"
        numeric_type = "float"
    "#;
    assert!(matches!(
        ProfilesConfig::from_toml_str(unknown_table),
        Err(ConfigError::Toml(_))
    ));

    let unknown_param = r#"
        [[vector_axpy]]
        vendor = "amd"
        class = "gpu"
        numeric_type = "float"
        params = { simd_width = 1, local_size_0 = 64, num_groups = 64, strided = true, unroll = 4 }
    "#;
    assert!(matches!(
        ProfilesConfig::from_toml_str(unknown_param),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn test_bad_vendor_is_rejected() {
    let source = r#"
        [[vector_axpy]]
        vendor = "acme"
        class = "gpu"
        numeric_type = "float"
        params = { simd_width = 1, local_size_0 = 64, num_groups = 64, strided = true }
    "#;
    assert!(matches!(
        ProfilesConfig::from_toml_str(source),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn test_missing_file_reports_path() {
    let path = std::env::temp_dir().join("devkern-config-tests-missing.toml");
    match ProfilesConfig::from_path(&path) {
        Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected Io, got {:?}", other),
    }
}

#[test]
fn test_from_path_reads_file() {
    let path = std::env::temp_dir().join(format!("devkern-config-tests-{}.toml", std::process::id()));
    std::fs::write(&path, OVERRIDES).expect("temp dir is writable");
    let config = ProfilesConfig::from_path(&path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(config.expect("valid overrides").vector_axpy.len(), 2);
}

#[test]
fn test_demo_profiles_load() {
    let config = ProfilesConfig::from_toml_str(include_str!("../demos/profiles.toml"))
        .expect("demo overrides are valid");
    assert_eq!(config.len(), 3);
    let profiles = load_profiles(Some(config)).expect("tables stay complete");
    let (params, from) = profiles.matrix_product_nt.resolve_with_source(&kepler("Tesla K20m"));
    assert_eq!(from, ResolvedFrom::Exact);
    assert_eq!(params.tile_rows(), 64);
}
