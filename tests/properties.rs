//! Properties every analysis must satisfy, over randomly judged factor sets.

use proptest::prelude::*;

use ism::{Analysis, Factor, Factors, Relation, Ssim};

fn relation() -> impl Strategy<Value = Relation> {
    prop_oneof![
        Just(Relation::Drives),
        Just(Relation::DrivenBy),
        Just(Relation::Mutual),
        Just(Relation::Unrelated),
    ]
}

/// A factor count and one relation per unordered pair, in presentation order.
fn judgments() -> impl Strategy<Value = (usize, Vec<Relation>)> {
    (2_usize..9).prop_flat_map(|n| (Just(n), prop::collection::vec(relation(), n * (n - 1) / 2)))
}

fn build(n: usize, relations: &[Relation]) -> Ssim {
    let factors = Factors::from_factors((0..n).map(|i| Factor::new(format!("f{}", i), "")));
    let mut ssim = Ssim::new(factors.unwrap());
    let mut relations = relations.iter();
    for i in 0..n {
        for j in i + 1..n {
            let relation = *relations.next().unwrap();
            ssim.judge(&format!("f{}", i), &format!("f{}", j), relation).unwrap();
        }
    }
    ssim
}

proptest! {
    #[test]
    fn relations_encode_both_cells((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        let initial = ssim.initial_reachability().unwrap();
        let mut relations = relations.iter();
        for i in 0..n {
            prop_assert!(initial.matrix.reaches(i, i));
            for j in i + 1..n {
                let expected = match relations.next().unwrap() {
                    Relation::Drives => (1, 0),
                    Relation::DrivenBy => (0, 1),
                    Relation::Mutual => (1, 1),
                    Relation::Unrelated => (0, 0),
                };
                prop_assert_eq!((initial.matrix.get(i, j), initial.matrix.get(j, i)), expected);
            }
        }
    }

    #[test]
    fn reversed_judgments_read_back((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (a, b) = (format!("f{}", i), format!("f{}", j));
                let forward = ssim.relation(&a, &b).unwrap().unwrap();
                prop_assert_eq!(ssim.relation(&b, &a).unwrap(), Some(forward.reversed()));
            }
        }
    }

    #[test]
    fn closure_is_transitive_and_idempotent((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        let analysis = Analysis::new(&ssim).unwrap();
        let initial = &analysis.initial().matrix;
        let closed = &analysis.closed().matrix;

        prop_assert!(closed.is_transitive());
        for i in 0..n {
            prop_assert!(closed.reaches(i, i));
            for j in 0..n {
                // Closure only adds cells, and records exactly the ones it added.
                prop_assert!(!initial.reaches(i, j) || closed.reaches(i, j));
                let inferred = closed.reaches(i, j) && !initial.reaches(i, j);
                prop_assert_eq!(analysis.changes().contains(&(i, j)), inferred);
            }
        }

        let (again, changes) = closed.closure();
        prop_assert!(changes.is_empty());
        prop_assert_eq!(&again, closed);
    }

    #[test]
    fn powers_are_conserved((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        let analysis = Analysis::new(&ssim).unwrap();
        for reachability in [analysis.initial(), analysis.closed()].iter() {
            let driving: usize = reachability.powers.driving.iter().sum();
            let dependence: usize = reachability.powers.dependence.iter().sum();
            prop_assert_eq!(driving, reachability.matrix.ones());
            prop_assert_eq!(dependence, reachability.matrix.ones());
            prop_assert!(reachability.powers.driving.iter().all(|&p| p >= 1 && p <= n));
        }
    }

    #[test]
    fn levels_cover_every_factor_once((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        let analysis = Analysis::new(&ssim).unwrap();
        let partition = analysis.partition();

        let mut seen = vec![0; n];
        for (position, level) in partition.levels().iter().enumerate() {
            prop_assert_eq!(level.level, position + 1);
            prop_assert!(!level.factors.is_empty());
            for factor in level.factors.iter() {
                seen[factor] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&count| count == 1));

        // One iteration per level, each recording what it resolved.
        prop_assert_eq!(partition.iterations().len(), partition.levels().len());
        for (step, level) in partition.iterations().iter().zip(partition.levels()) {
            prop_assert_eq!(step.iteration, level.level);
            prop_assert_eq!(&step.level_factors, &level.factors);
            prop_assert!(level.factors.is_subset(&step.remaining));
        }
    }

    #[test]
    fn influence_never_points_to_a_later_level((n, relations) in judgments()) {
        let ssim = build(n, &relations);
        let analysis = Analysis::new(&ssim).unwrap();
        let closed = &analysis.closed().matrix;
        let partition = analysis.partition();
        for i in 0..n {
            for j in 0..n {
                if closed.reaches(i, j) {
                    prop_assert!(partition.level_of(j).unwrap() <= partition.level_of(i).unwrap());
                }
            }
        }
    }
}
