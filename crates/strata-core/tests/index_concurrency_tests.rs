// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{added, modified, package, rendered, rule};
use strata_core::{make_commit_id, Generation, Index};

/// Readers pinned to generation 1 must observe identical results while a
/// writer keeps appending new generations.
#[test]
fn historical_reads_are_stable_under_concurrent_commits() {
    let index = Arc::new(Index::new());
    let g1 = index
        .add_commit(
            make_commit_id("base"),
            &added(vec![package(
                "app",
                vec![rule("//app:main", &["//app:util"]), rule("//app:util", &[])],
            )]),
        )
        .unwrap();
    let baseline = rendered(&index.targets(g1));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            let stop = Arc::clone(&stop);
            let baseline = baseline.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    assert_eq!(rendered(&index.targets(g1)), baseline);
                }
            })
        })
        .collect();

    for i in 0..64 {
        let label = format!("commit-{i}");
        index
            .add_commit(
                make_commit_id(&label),
                &modified(vec![package(
                    "app",
                    vec![
                        rule("//app:main", &["//app:util"]),
                        rule("//app:util", &[]),
                        rule(&format!("//app:gen{i}"), &[]),
                    ],
                )]),
            )
            .unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(index.latest_generation(), Generation::from_raw(65));
    assert_eq!(rendered(&index.targets(g1)), baseline);
}

/// A reader that resolves a commit's generation must see that commit's state
/// fully applied: never a partial package.
#[test]
fn readers_never_observe_a_partial_commit() {
    let index = Arc::new(Index::new());
    index
        .add_commit(
            make_commit_id("seed"),
            &added(vec![package("seed", vec![rule("//seed:s", &[])])]),
        )
        .unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let g = index.latest_generation();
                    // Both rules of each batch package land in one write-lock
                    // section, so at any visible generation a package has
                    // either both targets or none.
                    for pair in index.targets_under_base_path(g, &"batch".into()).chunks(2) {
                        assert_eq!(pair.len(), 2, "saw half a package at generation {g}");
                    }
                }
            })
        })
        .collect();

    for i in 0..32 {
        let path = format!("batch/p{i:02}");
        let label = format!("batch-{i}");
        index
            .add_commit(
                make_commit_id(&label),
                &added(vec![package(
                    &path,
                    vec![
                        rule(&format!("//{path}:a"), &[]),
                        rule(&format!("//{path}:b"), &[]),
                    ],
                )]),
            )
            .unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
}

/// Interner handles assigned on the commit path stay valid for readers that
/// race with the commit.
#[test]
fn queries_race_safely_with_interning() {
    let index = Arc::new(Index::new());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let index = Arc::clone(&index);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let g = index.latest_generation();
                    for t in index.targets(g) {
                        // Every handle the index hands back must translate.
                        assert!(index.target_node(g, &t).is_some());
                    }
                }
            })
        })
        .collect();

    for i in 0..48 {
        let label = format!("c{i}");
        index
            .add_commit(
                make_commit_id(&label),
                &added(vec![package(
                    &format!("pkg{i}"),
                    vec![rule(&format!("//pkg{i}:r"), &[])],
                )]),
            )
            .unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
}
