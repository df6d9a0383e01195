// Aggregator tests: merge rules, window eviction, derived metrics, display order, atomicity

mod common;

use std::sync::Arc;

use common::{hosts, lost, ok};
use hostwatch::aggregator::StatsAggregator;
use hostwatch::error::HostwatchError;
use hostwatch::models::Outcome;

#[tokio::test]
async fn three_rounds_one_loss() {
    let agg = StatsAggregator::new(10, &hosts(&["h"]));
    agg.merge(&ok("h", 1, 10.0)).await.unwrap();
    agg.merge(&lost("h", 2)).await.unwrap();
    agg.merge(&ok("h", 3, 20.0)).await.unwrap();

    let h = agg.host("h").await.unwrap();
    assert_eq!(h.rounds, 3);
    assert_eq!(h.losses, 1);
    assert_eq!(h.loss_percent, 33.3);
    assert!((h.avg_rtt_ms - 10.0).abs() < 1e-9);
    assert_eq!(
        h.window,
        vec![Outcome::Success, Outcome::Failure, Outcome::Success]
    );
}

#[tokio::test]
async fn window_of_two_evicts_oldest() {
    let agg = StatsAggregator::new(2, &hosts(&["h"]));
    agg.merge_all(&[ok("h", 1, 10.0), lost("h", 2), ok("h", 3, 20.0), ok("h", 4, 30.0)])
        .await
        .unwrap();

    let h = agg.host("h").await.unwrap();
    assert_eq!(h.rounds, 4);
    assert_eq!(h.losses, 1);
    assert_eq!(h.window, vec![Outcome::Success, Outcome::Success]);
    assert!((h.avg_rtt_ms - 15.0).abs() < 1e-9);
}

#[tokio::test]
async fn first_result_initializes_stats() {
    let agg = StatsAggregator::new(5, &[]);
    agg.merge(&lost("new", 1)).await.unwrap();

    let h = agg.host("new").await.unwrap();
    assert_eq!(h.rounds, 1);
    assert_eq!(h.losses, 1);
    assert_eq!(h.loss_percent, 100.0);
    assert_eq!(h.avg_rtt_ms, 0.0);
    assert_eq!(h.window, vec![Outcome::Failure]);
}

#[tokio::test]
async fn window_never_exceeds_width_and_losses_never_exceed_rounds() {
    for width in 1..=4usize {
        let agg = StatsAggregator::new(width, &hosts(&["h"]));
        for round in 1..=25u64 {
            let result = if round % 3 == 0 {
                lost("h", round)
            } else {
                ok("h", round, round as f64)
            };
            agg.merge(&result).await.unwrap();
            let h = agg.host("h").await.unwrap();
            assert!(h.window.len() <= width);
            assert_eq!(h.window.len(), (round as usize).min(width));
            assert!(h.losses <= h.rounds);
            assert!((0.0..=100.0).contains(&h.loss_percent));
        }
    }
}

#[tokio::test]
async fn averages_equal_sums_over_rounds() {
    let agg = StatsAggregator::new(3, &hosts(&["h"]));
    let rtts = [1.5, 0.0, 7.25, 3.0, 11.0];
    for (i, rtt) in rtts.iter().enumerate() {
        let round = i as u64 + 1;
        let result = if *rtt == 0.0 {
            lost("h", round)
        } else {
            ok("h", round, *rtt)
        };
        agg.merge(&result).await.unwrap();
    }
    let h = agg.host("h").await.unwrap();
    let expected = rtts.iter().sum::<f64>() / rtts.len() as f64;
    assert!((h.avg_rtt_ms - expected).abs() < 1e-9);
    assert!((h.avg_latency_ms - expected).abs() < 1e-9);
}

#[tokio::test]
async fn loss_percent_rounds_to_one_decimal() {
    let agg = StatsAggregator::new(10, &hosts(&["h"]));
    agg.merge_all(&[lost("h", 1), lost("h", 2), ok("h", 3, 1.0)])
        .await
        .unwrap();
    assert_eq!(agg.host("h").await.unwrap().loss_percent, 66.7);
}

#[tokio::test]
async fn configured_order_wins_over_arrival_order() {
    let agg = StatsAggregator::new(4, &hosts(&["a", "b", "c"]));
    agg.merge_all(&[ok("c", 1, 1.0), ok("a", 1, 1.0), ok("b", 1, 1.0)])
        .await
        .unwrap();
    for round in 2..50 {
        agg.merge_all(&[ok("b", round, 1.0), ok("c", round, 1.0), ok("a", round, 1.0)])
            .await
            .unwrap();
        let order: Vec<String> = agg.snapshot().await.into_iter().map(|h| h.host).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}

#[tokio::test]
async fn unknown_hosts_append_in_first_seen_order() {
    let agg = StatsAggregator::new(4, &hosts(&["a"]));
    agg.merge_all(&[ok("z", 1, 1.0), ok("y", 1, 1.0), ok("a", 1, 1.0)])
        .await
        .unwrap();
    let order: Vec<String> = agg.snapshot().await.into_iter().map(|h| h.host).collect();
    assert_eq!(order, vec!["a", "z", "y"]);
}

#[tokio::test]
async fn hosts_without_results_are_not_recorded() {
    let agg = StatsAggregator::new(4, &hosts(&["a", "b"]));
    assert!(agg.snapshot().await.is_empty());
    agg.merge(&ok("b", 1, 1.0)).await.unwrap();
    assert_eq!(agg.recorded_hosts().await, 1);
    assert_eq!(agg.snapshot().await[0].host, "b");
}

#[tokio::test]
async fn stale_round_is_an_invariant_violation() {
    let agg = StatsAggregator::new(4, &hosts(&["h"]));
    agg.merge(&ok("h", 2, 5.0)).await.unwrap();

    let err = agg.merge(&ok("h", 2, 99.0)).await.unwrap_err();
    assert!(matches!(
        err,
        HostwatchError::QueueInvariant { ref host, round: 2, last_round: 2 } if host == "h"
    ));

    let h = agg.host("h").await.unwrap();
    assert_eq!(h.rounds, 1);
    assert_eq!(h.avg_rtt_ms, 5.0);
}

#[tokio::test]
async fn merge_all_stops_at_first_violation() {
    let agg = StatsAggregator::new(4, &hosts(&["h"]));
    let err = agg
        .merge_all(&[ok("h", 1, 1.0), ok("h", 2, 1.0), ok("h", 1, 1.0), ok("h", 3, 1.0)])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("queue invariant"));
    assert_eq!(agg.host("h").await.unwrap().rounds, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_snapshots_never_see_partial_merges() {
    const WIDTH: usize = 8;
    const ROUNDS: u64 = 2_000;
    let agg = Arc::new(StatsAggregator::new(WIDTH, &hosts(&["h"])));

    let writer = {
        let agg = Arc::clone(&agg);
        tokio::spawn(async move {
            for round in 1..=ROUNDS {
                let result = if round % 2 == 0 {
                    lost("h", round)
                } else {
                    ok("h", round, 2.0)
                };
                agg.merge(&result).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let agg = Arc::clone(&agg);
        readers.push(tokio::spawn(async move {
            loop {
                if let Some(h) = agg.host("h").await {
                    // Odd rounds succeed with rtt 2.0, even rounds are lost.
                    let expected_losses = h.rounds / 2;
                    assert_eq!(h.losses, expected_losses);
                    assert_eq!(h.window.len(), (h.rounds as usize).min(WIDTH));
                    let successes = h.rounds - expected_losses;
                    let expected_avg = successes as f64 * 2.0 / h.rounds as f64;
                    assert!((h.avg_rtt_ms - expected_avg).abs() < 1e-9);
                    let newest = *h.window.last().unwrap();
                    let expected_newest = if h.rounds % 2 == 0 {
                        Outcome::Failure
                    } else {
                        Outcome::Success
                    };
                    assert_eq!(newest, expected_newest);
                    if h.rounds == ROUNDS {
                        break;
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
