//! Resolution and generation benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use devkern::device::{Architecture, DeviceClass, DeviceDescriptor, NumericType, VendorId};
use devkern::ops::{Expr, MatrixArg, Operation, ScalarArg, Statement, VectorArg};
use devkern::profiles::Profiles;

fn devices() -> Vec<(&'static str, DeviceDescriptor)> {
    vec![
        (
            "exact",
            DeviceDescriptor::new(VendorId::NVIDIA, DeviceClass::Gpu, NumericType::Float)
                .with_architecture(Architecture::Fermi),
        ),
        (
            "named",
            DeviceDescriptor::new(VendorId::AMD, DeviceClass::Gpu, NumericType::Float)
                .with_architecture(Architecture::VolcanicIslands)
                .with_name("AMD Radeon R9 Fury"),
        ),
        (
            "unregistered",
            DeviceDescriptor::new(VendorId(0x1af4), DeviceClass::Gpu, NumericType::Double),
        ),
    ]
}

fn bench_resolve(c: &mut Criterion) {
    let profiles = Profiles::builtin().expect("builtin database is complete");
    let mut group = c.benchmark_group("resolve");

    for (label, device) in devices() {
        group.bench_with_input(BenchmarkId::from_parameter(label), &device, |b, device| {
            b.iter(|| black_box(profiles.matrix_product_nt.resolve(black_box(device))));
        });
    }

    group.finish();
}

fn vector(name: &str, size: &str) -> Expr {
    Expr::Vector(VectorArg::new(name, size))
}

fn operations() -> Vec<(&'static str, Operation)> {
    let alpha = || Expr::Scalar(ScalarArg::host("alpha"));
    let axpy = Operation::new(NumericType::Float).with(Statement::assign(
        vector("y", "N"),
        Expr::add(Expr::mul(alpha(), vector("x", "N")), vector("y", "N")),
    ));
    let dot = Operation::new(NumericType::Float).with(Statement::assign(
        Expr::Scalar(ScalarArg::device("s")),
        Expr::prod(vector("x", "N"), vector("y", "N")),
    ));
    let gemv = Operation::new(NumericType::Float).with(Statement::assign(
        vector("y", "N"),
        Expr::prod(
            Expr::Matrix(MatrixArg::new("A", "M", "N").transposed()),
            vector("x", "M"),
        ),
    ));
    let gemm = Operation::new(NumericType::Float).with(Statement::assign(
        Expr::Matrix(MatrixArg::new("C", "M", "N")),
        Expr::mul(
            alpha(),
            Expr::prod(
                Expr::Matrix(MatrixArg::new("A", "M", "K")),
                Expr::Matrix(MatrixArg::new("B", "N", "K").transposed()),
            ),
        ),
    ));
    vec![("axpy", axpy), ("dot", dot), ("gemv_t", gemv), ("gemm_nt", gemm)]
}

fn bench_generate(c: &mut Criterion) {
    let profiles = Profiles::builtin().expect("builtin database is complete");
    let device = DeviceDescriptor::unknown(DeviceClass::Gpu, NumericType::Float);
    let mut group = c.benchmark_group("generate");

    for (label, op) in operations() {
        group.bench_with_input(BenchmarkId::from_parameter(label), &op, |b, op| {
            b.iter(|| devkern::generate(&profiles, &device, black_box(op)).expect("valid operation"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_generate);
criterion_main!(benches);
