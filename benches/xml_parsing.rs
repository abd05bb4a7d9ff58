use bucket_client::mocks::TestFixtures;
use bucket_client::types::AccessPolicy;
use bucket_client::xml::{
    build_access_control_policy_xml, parse_access_control_policy, parse_list_bucket_result,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_xml(c: &mut Criterion) {
    let acl = TestFixtures::acl_xml("owner-id", true);
    let keys: Vec<String> = (0..1000).map(|i| format!("dir/object-{:04}.bin", i)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let listing = TestFixtures::list_objects_xml("demo", &key_refs, true);

    c.bench_function("parse_acl", |b| {
        b.iter(|| parse_access_control_policy(black_box(&acl)))
    });

    c.bench_function("build_acl", |b| {
        b.iter(|| build_access_control_policy_xml(black_box("owner-id"), AccessPolicy::Public))
    });

    c.bench_function("parse_listing_1000", |b| {
        b.iter(|| parse_list_bucket_result(black_box(&listing)))
    });
}

criterion_group!(benches, bench_xml);
criterion_main!(benches);
