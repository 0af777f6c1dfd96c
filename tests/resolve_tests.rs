//! Profile resolution tests

use devkern::device::{Architecture, DeviceClass, DeviceDescriptor, NumericType, VendorId};
use devkern::profiles::{
    MatrixProductParams, ProfileKey, ProfileStore, ProfileStoreBuilder, Profiles, ResolvedFrom,
    RowWiseParams, VectorAxpyParams,
};
use devkern::StoreError;
use proptest::prelude::*;

const BASE: VectorAxpyParams = VectorAxpyParams::new(1, 128, 128, true);
const KEPLER: VectorAxpyParams = VectorAxpyParams::new(2, 256, 512, true);
const KEPLER_DOUBLE: VectorAxpyParams = VectorAxpyParams::new(1, 256, 256, false);
const K20: VectorAxpyParams = VectorAxpyParams::new(4, 512, 1024, true);

fn kepler_key(name: &str, numeric_type: NumericType) -> ProfileKey {
    ProfileKey::new(
        VendorId::NVIDIA,
        DeviceClass::Gpu,
        Architecture::Kepler,
        name,
        numeric_type,
    )
}

/// Global defaults, a Kepler default for float and double, and a K20m
/// entry for float only
fn store() -> ProfileStore<VectorAxpyParams> {
    ProfileStoreBuilder::new()
        .defaults(BASE)
        .entry(kepler_key("", NumericType::Float), KEPLER)
        .entry(kepler_key("", NumericType::Double), KEPLER_DOUBLE)
        .entry(kepler_key("Tesla K20m", NumericType::Float), K20)
        .build("vector_axpy")
        .expect("complete table")
}

fn kepler(name: &str, numeric_type: NumericType) -> DeviceDescriptor {
    DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, numeric_type)
        .with_architecture(Architecture::Kepler)
        .with_name(name)
}

#[test]
fn test_exact_match() {
    let store = store();
    let (params, from) = store.resolve_with_source(&kepler("Tesla K20m", NumericType::Float));
    assert_eq!(params, &K20);
    assert_eq!(from, ResolvedFrom::Exact);
}

#[test]
fn test_unknown_vendor_uses_global_default() {
    let store = store();
    let device = DeviceDescriptor::new(VendorId(0x1234), DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::Kepler)
        .with_name("Tesla K20m");
    let (params, from) = store.resolve_with_source(&device);
    assert_eq!(params, &BASE);
    assert_eq!(from, ResolvedFrom::GlobalDefault);
}

#[test]
fn test_unknown_class_skips_vendor_data() {
    let store = store();
    let device = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Accelerator, NumericType::Float)
        .with_architecture(Architecture::Kepler);
    assert_eq!(store.resolve_with_source(&device), (&BASE, ResolvedFrom::GlobalDefault));
}

#[test]
fn test_unknown_architecture_skips_vendor_data() {
    let store = store();
    let device = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::Maxwell);
    assert_eq!(store.resolve_with_source(&device), (&BASE, ResolvedFrom::GlobalDefault));
}

#[test]
fn test_unknown_name_keeps_architecture_default() {
    let store = store();
    assert_eq!(
        store.resolve_with_source(&kepler("GeForce GTX 780", NumericType::Float)),
        (&KEPLER, ResolvedFrom::ArchitectureDefault)
    );
}

#[test]
fn test_unknown_numeric_type_keeps_architecture_default() {
    let store = store();
    // K20m has no double entry, Kepler does
    assert_eq!(
        store.resolve_with_source(&kepler("Tesla K20m", NumericType::Double)),
        (&KEPLER_DOUBLE, ResolvedFrom::ArchitectureDefault)
    );
}

#[test]
fn test_architecture_default_missing_type_degrades_to_global() {
    let store = store();
    assert_eq!(
        store.resolve_with_source(&kepler("Tesla K20m", NumericType::Int)),
        (&BASE, ResolvedFrom::GlobalDefault)
    );
}

#[test]
fn test_unregistered_vendor_double_matches_unknown_vendor() {
    let profiles = Profiles::builtin().expect("builtin database is complete");
    let unregistered = DeviceDescriptor::new(VendorId(0xBEEF), DeviceClass::Gpu, NumericType::Double);
    let unknown = DeviceDescriptor::unknown(DeviceClass::Gpu, NumericType::Double);

    assert!(std::ptr::eq(
        profiles.vector_axpy.resolve(&unregistered),
        profiles.vector_axpy.resolve(&unknown)
    ));
    assert!(std::ptr::eq(
        profiles.matrix_product_nt.resolve(&unregistered),
        profiles.matrix_product_nt.resolve(&unknown)
    ));
}

#[test]
fn test_builtin_vendor_presets() {
    let profiles = Profiles::builtin().expect("builtin database is complete");
    let fermi = DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::Fermi)
        .with_name("GeForce GTX 470");
    let (params, from) = profiles.vector_axpy.resolve_with_source(&fermi);
    assert_eq!(params, &VectorAxpyParams::new(1, 1024, 2048, true));
    assert_eq!(from, ResolvedFrom::ArchitectureDefault);

    let fiji = DeviceDescriptor::new(VendorId::AMD, DeviceClass::Gpu, NumericType::Float)
        .with_architecture(Architecture::VolcanicIslands);
    assert_eq!(
        profiles.row_wise_reduction.resolve(&fiji),
        &RowWiseParams::new(1, 2, 128, 256)
    );

    // Double precision on a tuned architecture still reaches the defaults
    let fermi_double = fermi.with_numeric_type(NumericType::Double);
    assert_eq!(
        profiles.matrix_product_nn.resolve_with_source(&fermi_double),
        (
            &MatrixProductParams::new(1, 8, 8, 8, 4, 4, 4, true, false, 8, 8),
            ResolvedFrom::GlobalDefault
        )
    );
}

#[test]
fn test_build_requires_every_global_default() {
    let mut builder = ProfileStoreBuilder::new();
    for numeric_type in NumericType::ALL {
        if numeric_type != NumericType::ULong {
            for class in DeviceClass::ALL {
                builder.insert(ProfileKey::global_default(class, numeric_type), BASE);
            }
        }
    }
    assert_eq!(
        builder.build("vector_axpy").unwrap_err(),
        StoreError::MissingGlobalDefault {
            table: "vector_axpy",
            class: DeviceClass::Gpu,
            numeric_type: NumericType::ULong,
        }
    );
}

fn arb_vendor() -> impl Strategy<Value = VendorId> {
    prop_oneof![
        Just(VendorId::UNKNOWN),
        Just(VendorId::AMD),
        Just(VendorId::NVIDIA),
        Just(VendorId::INTEL),
        any::<u32>().prop_map(VendorId),
    ]
}

fn arb_class() -> impl Strategy<Value = DeviceClass> {
    prop::sample::select(DeviceClass::ALL.to_vec())
}

fn arb_numeric_type() -> impl Strategy<Value = NumericType> {
    prop::sample::select(NumericType::ALL.to_vec())
}

fn arb_architecture() -> impl Strategy<Value = Architecture> {
    prop::sample::select(vec![
        Architecture::Unknown,
        Architecture::Tesla,
        Architecture::Fermi,
        Architecture::Kepler,
        Architecture::Maxwell,
        Architecture::Evergreen,
        Architecture::NorthernIslands,
        Architecture::SouthernIslands,
        Architecture::VolcanicIslands,
    ])
}

fn arb_device() -> impl Strategy<Value = DeviceDescriptor> {
    (
        arb_vendor(),
        arb_class(),
        arb_architecture(),
        prop_oneof![Just(String::new()), Just("Tesla K20m".to_string()), "[a-zA-Z0-9 ]{0,16}"],
        arb_numeric_type(),
    )
        .prop_map(|(vendor, class, architecture, name, numeric_type)| {
            DeviceDescriptor::new(vendor, class, numeric_type)
                .with_architecture(architecture)
                .with_name(name)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every descriptor resolves, in every builtin table
    #[test]
    fn resolution_is_total(device in arb_device()) {
        let profiles = Profiles::builtin().expect("builtin database is complete");
        for table in devkern::profiles::ProfileTable::ALL {
            let _ = profiles.resolve_table(table, &device);
        }
        let _ = store().resolve(&device);
    }

    /// Architecture and name are irrelevant once the vendor is unregistered
    #[test]
    fn unregistered_vendor_is_global_default(
        id in 1u32..4000,
        class in arb_class(),
        architecture in arb_architecture(),
        name in "[a-zA-Z0-9 ]{0,16}",
        numeric_type in arb_numeric_type(),
    ) {
        let store = store();
        let device = DeviceDescriptor::new(VendorId(id), class, numeric_type)
            .with_architecture(architecture)
            .with_name(name);
        let (params, from) = store.resolve_with_source(&device);
        prop_assert!(std::ptr::eq(params, store.global_default(class, numeric_type)));
        prop_assert_eq!(from, ResolvedFrom::GlobalDefault);
    }
}
