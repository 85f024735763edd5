use blog_rights::{
    persisted_rights, AuthorizationCheck, AuthorizationConfig, AuthorizationService,
    MemoryRightsStore, MemoryRoleStore, Principal, Rights, RoleStore, TenantId,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

fn service_with_authors(tenant: &TenantId) -> AuthorizationService {
    let role_store = MemoryRoleStore::with_roles(tenant, &["Authors", "Reviewers"]).unwrap();
    role_store
        .add_users_to_roles(tenant, &["alice".to_string()], &["Authors".to_string()])
        .unwrap();
    let rights_store = MemoryRightsStore::with_rights(
        tenant,
        persisted_rights! {
            "Authors" => [CreateNewPosts, EditOwnPosts, DeleteOwnPosts, PublishOwnPosts],
            "Reviewers" => [ViewUnpublishedPosts, ModerateComments],
        },
    );
    let service = AuthorizationService::with_stores(
        role_store,
        rights_store,
        AuthorizationConfig::default().with_audit(false),
    )
    .unwrap();
    service.ensure_tenant(tenant).unwrap();
    service
}

fn bench_has_right(c: &mut Criterion) {
    let tenant = TenantId::new();
    let service = service_with_authors(&tenant);
    let roles = ["Reviewers".to_string(), "Authors".to_string()];

    c.bench_function("has_right", |b| {
        b.iter(|| {
            black_box(
                service
                    .has_right(&tenant, black_box(Rights::PublishOwnPosts), Some(roles.as_slice()))
                    .unwrap(),
            )
        })
    });
}

fn bench_security_checks(c: &mut Criterion) {
    let tenant = TenantId::new();
    let service = service_with_authors(&tenant);
    let alice = Principal::authenticated("alice");
    let visitor = Principal::anonymous();
    let wanted = [Rights::CreateNewPosts, Rights::EditOwnPosts, Rights::PublishOwnPosts];

    c.bench_function("is_authorized_all_authenticated", |b| {
        let security = service.security(&tenant, &alice).unwrap();
        b.iter(|| {
            black_box(
                security
                    .is_authorized(AuthorizationCheck::HasAll, black_box(&wanted))
                    .unwrap(),
            )
        })
    });

    c.bench_function("is_authorized_to_anonymous", |b| {
        let security = service.security(&tenant, &visitor).unwrap();
        b.iter(|| black_box(security.is_authorized_to(Rights::ViewPublicPosts).unwrap()))
    });
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_all_rights");

    for role_count in [3usize, 30, 300] {
        let tenant = TenantId::new();
        let names: Vec<String> = (0..role_count).map(|i| format!("Role{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut persisted = blog_rights::PersistedRights::new();
        for name in &names {
            persisted.insert(
                name.clone(),
                vec!["ViewPublicPosts".to_string(), "CreateComments".to_string()],
            );
        }
        let service = AuthorizationService::with_stores(
            MemoryRoleStore::with_roles(&tenant, &refs).unwrap(),
            MemoryRightsStore::with_rights(&tenant, persisted),
            AuthorizationConfig::default().with_audit(false),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(role_count), &role_count, |b, _| {
            b.iter(|| service.refresh_all_rights(black_box(&tenant)).unwrap())
        });
    }

    group.finish();
}

fn bench_concurrent_checks(c: &mut Criterion) {
    let tenant = TenantId::new();
    let service = Arc::new(service_with_authors(&tenant));

    c.bench_function("concurrent_has_right_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let service = Arc::clone(&service);
                    std::thread::spawn(move || {
                        let roles = ["Authors"];
                        for _ in 0..100 {
                            black_box(
                                service
                                    .has_right(&tenant, Rights::EditOwnPosts, Some(roles.as_slice()))
                                    .unwrap(),
                            );
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_has_right,
    bench_security_checks,
    bench_refresh,
    bench_concurrent_checks
);
criterion_main!(benches);
