use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Barrier};
use std::thread;

use meetpay_core::UserId;
use meetpay_infra::{EngineConfig, LifecycleManager};
use meetpay_invites::NewInvite;

fn user(id: &str) -> UserId {
    UserId::parse(id).expect("valid user id")
}

fn request(creator: &UserId) -> NewInvite {
    NewInvite {
        creator_id: creator.clone(),
        title: "Bench session".to_string(),
        description: None,
        amount: Decimal::new(4_999, 2),
        currency: None,
        duration_minutes: 30,
        available_slots: vec![],
        payment_fingerprint: "4242".to_string(),
    }
}

fn bench_create_invite(c: &mut Criterion) {
    let manager = LifecycleManager::in_memory(EngineConfig::default());
    let creator = user("creator");

    c.bench_function("create_invite", |b| {
        b.iter(|| {
            let invite = manager
                .create_invite(request(&creator))
                .expect("create invite");
            black_box(invite);
        });
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let manager = LifecycleManager::in_memory(EngineConfig::default());
    let creator = user("creator");
    let invitee = user("invitee");

    c.bench_function("create_book_confirm", |b| {
        b.iter(|| {
            let invite = manager
                .create_invite(request(&creator))
                .expect("create invite");
            let at = Utc::now() + Duration::days(1);
            manager
                .book(invite.id_typed(), &invitee, at)
                .expect("book invite");
            let done = manager
                .confirm(invite.id_typed(), &creator)
                .expect("confirm invite");
            black_box(done);
        });
    });
}

/// Several invitees race for the same invite; exactly one wins each round.
fn bench_contended_booking(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_booking");

    for contenders in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(contenders as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(contenders),
            &contenders,
            |b, &contenders| {
                let manager = Arc::new(LifecycleManager::in_memory(EngineConfig::default()));
                let creator = user("creator");

                b.iter(|| {
                    let invite = manager
                        .create_invite(request(&creator))
                        .expect("create invite");
                    let invite_id = invite.id_typed();
                    let at = Utc::now() + Duration::days(1);
                    let barrier = Arc::new(Barrier::new(contenders));

                    let handles: Vec<_> = (0..contenders)
                        .map(|i| {
                            let manager = manager.clone();
                            let barrier = barrier.clone();
                            thread::spawn(move || {
                                let invitee = user(&format!("invitee-{i}"));
                                barrier.wait();
                                manager.book(invite_id, &invitee, at).is_ok()
                            })
                        })
                        .collect();

                    let winners = handles
                        .into_iter()
                        .map(|h| h.join().expect("booking thread"))
                        .filter(|won| *won)
                        .count();
                    assert_eq!(winners, 1);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_invite,
    bench_full_lifecycle,
    bench_contended_booking
);
criterion_main!(benches);
