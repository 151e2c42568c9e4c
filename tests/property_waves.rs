use std::collections::HashSet;

use proptest::prelude::*;
use wavedag::dag::{DependencyGraph, TaskSpec};

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskSpec>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..4),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let deps: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    TaskSpec::new(format!("task_{i}"))
                        .with_dependencies(deps.into_iter().map(|d| format!("task_{d}")))
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn every_task_lands_in_exactly_one_wave_after_its_dependencies(specs in dag_strategy(25)) {
        let mut graph = DependencyGraph::build(specs.clone()).unwrap();
        let waves = graph.compute_waves().unwrap();

        let mut seen = HashSet::new();
        for (idx, wave) in waves.iter().enumerate() {
            prop_assert_eq!(wave.number, idx + 1);
            prop_assert!(!wave.is_empty());
            for id in &wave.tasks {
                prop_assert!(seen.insert(id.clone()), "{} appears twice", id);
            }
        }
        prop_assert_eq!(seen.len(), specs.len());

        for spec in &specs {
            let wave = graph.get_wave_for_task(&spec.id).unwrap();
            let deepest = spec
                .dependencies
                .iter()
                .map(|d| graph.get_wave_for_task(d).unwrap())
                .max()
                .unwrap_or(0);
            prop_assert_eq!(wave, deepest + 1);
        }

        let stats = graph.get_wave_stats();
        prop_assert_eq!(stats.total_tasks, specs.len());
        prop_assert_eq!(stats.total_waves, waves.len());
    }

    #[test]
    fn closing_a_chain_into_a_loop_is_always_a_cycle(len in 2usize..12) {
        let specs: Vec<TaskSpec> = (0..len)
            .map(|i| TaskSpec::new(format!("n{i}")).after(format!("n{}", (i + 1) % len)))
            .collect();
        let mut graph = DependencyGraph::build(specs).unwrap();
        prop_assert!(graph.compute_waves().is_err());
    }
}
