// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use stronghold_tl2::{AbortReason, Config, Stm, TxAttrs};

#[ctor::ctor]
/// Runs before any of the tests in this file.
fn init_logger() {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Debug).try_init();
}

#[test]
fn single_threaded_counter() {
    let stm = Stm::new();
    let counter = stm.create(0u64);

    for _ in 0..1000 {
        let c = counter.clone();
        stm.read_write(move |tx| {
            let v = tx.load(c.cell())?;
            tx.store(c.cell(), v + 1)?;
            Ok(())
        })
        .unwrap();
    }

    assert_eq!(counter.read_atomic(), 1000);
}

#[test]
fn contended_counter_under_a_thread_pool() {
    let stm = Arc::new(Stm::new());
    let counter = stm.create(0u64);
    let pool = threadpool::ThreadPool::new(8);

    const INCREMENTS: usize = 2000;
    for _ in 0..INCREMENTS {
        let stm = stm.clone();
        let c = counter.clone();
        pool.execute(move || {
            stm.read_write(move |tx| {
                let v = tx.load(c.cell())?;
                tx.store(c.cell(), v + 1)?;
                Ok(())
            })
            .unwrap();
        });
    }
    pool.join();

    assert_eq!(counter.read_atomic(), INCREMENTS as u64);
    assert!(stm.get_stats().total_aborts() > 0, "8-way contention on one counter should force at least one abort");
}

#[test]
fn bank_transfer_preserves_total_balance() {
    let stm = Arc::new(Stm::new());
    const ACCOUNTS: usize = 8;
    let accounts: Vec<_> = (0..ACCOUNTS).map(|_| stm.create(1000i64)).collect();
    let pool = threadpool::ThreadPool::new(8);

    const TRANSFERS: usize = 2000;
    for _ in 0..TRANSFERS {
        let stm = stm.clone();
        let mut rng = rand::thread_rng();
        let from_idx = rng.gen_range(0..ACCOUNTS);
        let mut to_idx = rng.gen_range(0..ACCOUNTS);
        if to_idx == from_idx {
            to_idx = (to_idx + 1) % ACCOUNTS;
        }
        let from = accounts[from_idx].clone();
        let to = accounts[to_idx].clone();
        pool.execute(move || {
            stm.read_write(move |tx| {
                let a = tx.load(from.cell())? as i64;
                let b = tx.load(to.cell())? as i64;
                tx.store(from.cell(), (a - 1) as u64)?;
                tx.store(to.cell(), (b + 1) as u64)?;
                Ok(())
            })
            .unwrap();
        });
    }
    pool.join();

    let total: i64 = accounts.iter().map(|a| a.read_atomic()).sum();
    assert_eq!(total, 1000 * ACCOUNTS as i64);
}

#[test]
fn read_only_transaction_observes_a_consistent_snapshot() {
    let stm = Arc::new(Stm::new());
    let a = stm.create(0u64);
    let b = stm.create(0u64);

    // keep a + b invariant at 100 under concurrent writers
    let setup_a = a.clone();
    let setup_b = b.clone();
    stm.read_write(move |tx| {
        tx.store(setup_a.cell(), 100)?;
        tx.store(setup_b.cell(), 0)?;
        Ok(())
    })
    .unwrap();

    let writer_stm = stm.clone();
    let wa = a.clone();
    let wb = b.clone();
    let writer = std::thread::spawn(move || {
        for _ in 0..500 {
            writer_stm
                .read_write(|tx| {
                    let av = tx.load(wa.cell())?;
                    let bv = tx.load(wb.cell())?;
                    if av == 0 {
                        return Ok(());
                    }
                    tx.store(wa.cell(), av - 1)?;
                    tx.store(wb.cell(), bv + 1)?;
                    Ok(())
                })
                .unwrap();
        }
    });

    let violations = Arc::new(AtomicUsize::new(0));
    let reader_violations = violations.clone();
    let ra = a.clone();
    let rb = b.clone();
    let reader_stm = stm.clone();
    let reader = std::thread::spawn(move || {
        for _ in 0..500 {
            let sum = reader_stm
                .read_only(|tx| {
                    let av = tx.load(ra.cell())?;
                    let bv = tx.load(rb.cell())?;
                    Ok(av + bv)
                })
                .unwrap();
            if sum != 100 {
                reader_violations.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn explicit_abort_with_no_retry_is_not_retried() {
    let stm = Stm::new();
    let counter = stm.create(0u64);
    let attempts = Arc::new(AtomicUsize::new(0));

    let c = counter.clone();
    let a = attempts.clone();
    let result: Result<(), AbortReason> = stm.read_write_with(TxAttrs { no_retry: true, ..TxAttrs::default() }, move |tx| {
        a.fetch_add(1, Ordering::SeqCst);
        let _ = tx.load(c.cell())?;
        Err(tx.abort())
    });

    assert_eq!(result.unwrap_err(), AbortReason::Explicit);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(counter.read_atomic(), 0);
}

#[test]
fn clock_rollover_does_not_disrupt_correctness() {
    let stm = Arc::new(Stm::with_config(Config { version_max_override: Some(1024), ..Config::default() }));
    let counter = stm.create(0u64);
    let pool = threadpool::ThreadPool::new(4);

    // comfortably more than version_max_override, so at least one rollover barrier
    // runs partway through
    const INCREMENTS: usize = 4000;
    for _ in 0..INCREMENTS {
        let stm = stm.clone();
        let c = counter.clone();
        pool.execute(move || {
            stm.read_write(move |tx| {
                let v = tx.load(c.cell())?;
                tx.store(c.cell(), v + 1)?;
                Ok(())
            })
            .unwrap();
        });
    }
    pool.join();

    assert_eq!(counter.read_atomic(), INCREMENTS as u64);

    // commits keep succeeding after the rollover has happened at least once
    let after = stm
        .read_write(|tx| {
            let v = tx.load(counter.cell())?;
            tx.store(counter.cell(), v + 1)?;
            Ok(v + 1)
        })
        .unwrap();
    assert_eq!(after, INCREMENTS as u64 + 1);
}

#[test]
fn concurrent_writers_eventually_converge_without_lost_updates() {
    let stm = Arc::new(Stm::new());
    let counter = stm.create(0u64);
    let pool = threadpool::ThreadPool::new(16);

    const WORKERS: usize = 16;
    const PER_WORKER: usize = 200;
    for _ in 0..WORKERS {
        let stm = stm.clone();
        let c = counter.clone();
        pool.execute(move || {
            for _ in 0..PER_WORKER {
                stm.read_write(|tx| {
                    let v = tx.load(c.cell())?;
                    tx.store(c.cell(), v + 1)?;
                    Ok(())
                })
                .unwrap();
            }
        });
    }
    pool.join();

    assert_eq!(counter.read_atomic(), (WORKERS * PER_WORKER) as u64);
    let stats = stm.get_stats();
    assert_eq!(stats.commits, (WORKERS * PER_WORKER) as u64);
}
