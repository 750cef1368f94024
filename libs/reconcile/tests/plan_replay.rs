//! End-to-end reconciliation tests: full plans in, action traces out,
//! verified by replaying the trace against the catalog the way the fleet
//! simulator would.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use proptest::prelude::*;

use fleetplan_core::{
    Action, ActionKind, Catalog, Datacenter, DatacenterId, DemandTable, GenerationId,
    LatencyTier, ServerFamily, ServerGeneration, ServerId, TimeStep,
};
use fleetplan_reconcile::Reconciler;

/// Replays an action trace in order, asserting the fleet invariants hold
/// after every single action, not just at step boundaries.
///
/// Checks:
/// - per-datacenter slot usage stays within `[0, capacity]`
/// - no action falls outside its generation's lifecycle window
/// - server IDs are globally unique and never reused after dismissal
/// - dismissals retire the oldest live instance of their key (FIFO)
/// - time steps never decrease along the trace
fn replay(catalog: &Catalog, actions: &[Action]) -> BTreeMap<(DatacenterId, GenerationId), u32> {
    let mut usage: HashMap<DatacenterId, u32> = HashMap::new();
    let mut live: BTreeMap<(DatacenterId, GenerationId), VecDeque<ServerId>> = BTreeMap::new();
    let mut ever_seen: HashSet<ServerId> = HashSet::new();
    let mut last_step = TimeStep::new(1);

    for action in actions {
        assert!(
            action.time_step >= last_step,
            "time steps must be non-decreasing"
        );
        last_step = action.time_step;

        let generation = catalog.generation(&action.server_generation).unwrap();
        let datacenter = catalog.datacenter(&action.datacenter_id).unwrap();
        assert!(
            generation.is_active(action.time_step),
            "action at step {} outside window of {}",
            action.time_step,
            generation.id
        );

        let key = (action.datacenter_id.clone(), action.server_generation.clone());
        let used = usage.entry(action.datacenter_id.clone()).or_insert(0);

        match action.action {
            ActionKind::Buy => {
                assert!(
                    ever_seen.insert(action.server_id),
                    "server ID reused: {}",
                    action.server_id
                );
                *used += generation.slot_size;
                assert!(
                    *used <= datacenter.slots_capacity,
                    "capacity exceeded in {} after buy: {} > {}",
                    datacenter.id,
                    used,
                    datacenter.slots_capacity
                );
                live.entry(key).or_default().push_back(action.server_id);
            }
            ActionKind::Dismiss => {
                let queue = live.get_mut(&key).expect("dismiss for key with no live instances");
                let oldest = queue.pop_front().expect("dismiss from empty queue");
                assert_eq!(
                    oldest, action.server_id,
                    "dismissal must retire the oldest live instance"
                );
                *used = used
                    .checked_sub(generation.slot_size)
                    .expect("usage went negative");
            }
        }
    }

    live.into_iter()
        .filter(|(_, queue)| !queue.is_empty())
        .map(|(key, queue)| (key, queue.len() as u32))
        .collect()
}

/// Capacity 10, slot size 2, one datacenter, one generation active [1, 100).
fn tiny_catalog() -> Catalog {
    let datacenters = vec![Datacenter {
        id: "DC1".into(),
        cost_of_energy: 0.25,
        slots_capacity: 10,
    }];
    let generations = vec![ServerGeneration {
        id: "CPU.S1".into(),
        family: ServerFamily::Cpu,
        slot_size: 2,
        active_from: TimeStep::new(1),
        active_until: TimeStep::new(100),
    }];
    let routes = BTreeMap::from([(LatencyTier::Low, vec![DatacenterId::new("DC1")])]);
    Catalog::new(datacenters, generations, routes).unwrap()
}

fn plan(counts: &[(u32, u32)]) -> DemandTable {
    let mut table = DemandTable::new();
    for (step, count) in counts {
        table.push(
            TimeStep::new(*step),
            LatencyTier::Low,
            "CPU.S1".into(),
            *count,
        );
    }
    table
}

#[test]
fn scenario_a_grow_then_shrink_within_capacity() {
    let catalog = tiny_catalog();
    let mut reconciler = Reconciler::new(catalog.clone());

    let actions = reconciler
        .run(&plan(&[(1, 3), (2, 5), (3, 2)]))
        .unwrap();

    let per_step: Vec<(u32, ActionKind)> = actions
        .iter()
        .map(|a| (a.time_step.value(), a.action))
        .collect();
    let buys_at = |s| per_step.iter().filter(|(t, k)| *t == s && *k == ActionKind::Buy).count();
    let dismissals_at =
        |s| per_step.iter().filter(|(t, k)| *t == s && *k == ActionKind::Dismiss).count();

    assert_eq!(buys_at(1), 3);
    assert_eq!(buys_at(2), 2);
    assert_eq!(dismissals_at(3), 3);
    assert_eq!(actions.len(), 8);

    // The three dismissals retire the three oldest purchases, in order.
    let bought: Vec<_> = actions
        .iter()
        .filter(|a| a.action == ActionKind::Buy)
        .map(|a| a.server_id)
        .collect();
    let dismissed: Vec<_> = actions
        .iter()
        .filter(|a| a.action == ActionKind::Dismiss)
        .map(|a| a.server_id)
        .collect();
    assert_eq!(dismissed, bought[..3]);

    let final_counts = replay(&catalog, &actions);
    assert_eq!(final_counts[&("DC1".into(), "CPU.S1".into())], 2);
}

#[test]
fn scenario_b_demand_outside_window_is_ignored() {
    let catalog = tiny_catalog();
    let mut reconciler = Reconciler::new(catalog);

    // Steps 100+ are past CPU.S1's retirement.
    let actions = reconciler.run(&plan(&[(1, 2), (100, 5), (101, 5)])).unwrap();

    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|a| a.time_step == TimeStep::new(1)));
    // Snapshot unchanged by the skipped cells.
    assert_eq!(reconciler.realized(&"DC1".into(), &"CPU.S1".into()), 2);
}

#[test]
fn scenario_c_clamped_growth_feeds_later_deltas() {
    let catalog = tiny_catalog();
    let mut reconciler = Reconciler::new(catalog.clone());

    // Step 1 asks for 8 but only 5 fit; step 2's request of 6 is then a
    // growth of 0 (still clamped to 5); step 3 shrinks from 5, not 8.
    let actions = reconciler.run(&plan(&[(1, 8), (2, 6), (3, 3)])).unwrap();

    let buys = actions.iter().filter(|a| a.action == ActionKind::Buy).count();
    let dismissals = actions.iter().filter(|a| a.action == ActionKind::Dismiss).count();
    assert_eq!(buys, 5);
    assert_eq!(dismissals, 2);

    let final_counts = replay(&catalog, &actions);
    assert_eq!(final_counts[&("DC1".into(), "CPU.S1".into())], 3);
}

#[test]
fn high_tier_alternates_datacenters_by_step_parity() {
    let catalog = Catalog::reference();
    let mut table = DemandTable::new();
    table.push(TimeStep::new(1), LatencyTier::High, "GPU.S1".into(), 2);
    table.push(TimeStep::new(2), LatencyTier::High, "GPU.S1".into(), 2);

    let mut reconciler = Reconciler::new(catalog.clone());
    let actions = reconciler.run(&table).unwrap();

    // Odd steps route to DC3, even steps to DC4; each datacenter's snapshot
    // starts at zero, so both steps emit buys.
    assert_eq!(actions.len(), 4);
    assert!(actions[..2].iter().all(|a| a.datacenter_id == "DC3".into()));
    assert!(actions[2..].iter().all(|a| a.datacenter_id == "DC4".into()));

    replay(&catalog, &actions);
}

#[test]
fn conservation_holds_at_every_prefix() {
    let catalog = tiny_catalog();
    let mut reconciler = Reconciler::new(catalog);

    let actions = reconciler
        .run(&plan(&[(1, 4), (2, 1), (3, 5), (4, 0)]))
        .unwrap();

    let mut net: i64 = 0;
    for action in &actions {
        match action.action {
            ActionKind::Buy => net += 1,
            ActionKind::Dismiss => net -= 1,
        }
        assert!(net >= 0, "more dismissals than buys at a prefix");
    }
    assert_eq!(net, 0, "step 4 demands zero, so the fleet must drain fully");
}

#[test]
fn reruns_are_deterministic_up_to_ids() {
    let catalog = tiny_catalog();
    let table = plan(&[(1, 3), (2, 5), (3, 0), (4, 2)]);

    let first = Reconciler::new(catalog.clone()).run(&table).unwrap();
    let second = Reconciler::new(catalog).run(&table).unwrap();

    let shape = |actions: &[Action]| {
        actions
            .iter()
            .map(|a| {
                (
                    a.time_step,
                    a.datacenter_id.clone(),
                    a.server_generation.clone(),
                    a.action,
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn reference_catalog_plan_replays_cleanly() {
    let catalog = Catalog::reference();
    let json = serde_json::json!({
        "1": {"low": [{"CPU.S1": 40}], "high": [{"GPU.S1": 6}]},
        "2": {"low": [{"CPU.S1": 55}], "high": [{"GPU.S1": 6}]},
        "3": {"low": [{"CPU.S1": 20}], "medium": [{"CPU.S1": 10}]},
        "40": {"low": [{"CPU.S2": 30}, {"CPU.S1": 0}]}
    });
    let table = DemandTable::from_json(&json).unwrap();

    let mut reconciler = Reconciler::new(catalog.clone());
    let actions = reconciler.run(&table).unwrap();
    let final_counts = replay(&catalog, &actions);

    assert_eq!(final_counts[&("DC1".into(), "CPU.S2".into())], 30);
    // CPU.S1 in DC1 drained to zero at step 40.
    assert!(!final_counts.contains_key(&("DC1".into(), "CPU.S1".into())));
}

proptest! {
    /// Random single-key plans: the trace always replays cleanly and the
    /// final live count equals the last realized (capacity-clamped) target.
    #[test]
    fn prop_random_plans_respect_invariants(counts in proptest::collection::vec(0u32..12, 1..20)) {
        let catalog = tiny_catalog();
        let table = plan(
            &counts
                .iter()
                .enumerate()
                .map(|(i, c)| (i as u32 + 1, *c))
                .collect::<Vec<_>>(),
        );

        let mut reconciler = Reconciler::new(catalog.clone());
        let actions = reconciler.run(&table).unwrap();
        let final_counts = replay(&catalog, &actions);

        let live = final_counts
            .get(&("DC1".into(), "CPU.S1".into()))
            .copied()
            .unwrap_or(0);
        let expected = counts.last().map(|c| (*c).min(5)).unwrap_or(0);
        prop_assert_eq!(live, expected);
        prop_assert_eq!(reconciler.slot_usage(&"DC1".into()), live * 2);
    }

    /// Two generations sharing one datacenter: combined usage never exceeds
    /// capacity, whatever the interleaving of requests.
    #[test]
    fn prop_shared_capacity_never_oversubscribed(
        cpu in proptest::collection::vec(0u32..10, 1..12),
        gpu in proptest::collection::vec(0u32..10, 1..12),
    ) {
        let datacenters = vec![Datacenter {
            id: "DC1".into(),
            cost_of_energy: 0.25,
            slots_capacity: 16,
        }];
        let generations = vec![
            ServerGeneration {
                id: "CPU.S1".into(),
                family: ServerFamily::Cpu,
                slot_size: 2,
                active_from: TimeStep::new(1),
                active_until: TimeStep::new(100),
            },
            ServerGeneration {
                id: "GPU.S1".into(),
                family: ServerFamily::Gpu,
                slot_size: 4,
                active_from: TimeStep::new(1),
                active_until: TimeStep::new(100),
            },
        ];
        let routes = BTreeMap::from([(LatencyTier::Low, vec![DatacenterId::new("DC1")])]);
        let catalog = Catalog::new(datacenters, generations, routes).unwrap();

        let mut table = DemandTable::new();
        for (i, c) in cpu.iter().enumerate() {
            table.push(TimeStep::new(i as u32 + 1), LatencyTier::Low, "CPU.S1".into(), *c);
        }
        for (i, c) in gpu.iter().enumerate() {
            table.push(TimeStep::new(i as u32 + 1), LatencyTier::Low, "GPU.S1".into(), *c);
        }

        let mut reconciler = Reconciler::new(catalog.clone());
        let actions = reconciler.run(&table).unwrap();

        // replay() asserts the capacity invariant after every action.
        replay(&catalog, &actions);
        prop_assert!(reconciler.slot_usage(&"DC1".into()) <= 16);
    }
}
