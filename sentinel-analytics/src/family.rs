//! Family resolver
//!
//! Computes effective (mutual), alleged (one-way), and indirect
//! (one hop through effective sets) family relations from declared-family
//! lists. Recomputed from scratch each cycle over an arena-indexed
//! adjacency so no incremental bookkeeping or cycle detection is needed.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use sentinel_core::{FamilyRelation, Fingerprint};

/// Resolve family relations for the whole population.
///
/// Input: per relay, the list of fingerprints it declares kinship with.
/// Declarations naming fingerprints outside the population are kept as
/// alleged (the claim exists, its target just isn't currently known).
/// Self-declarations are ignored.
pub fn resolve_families(
    declarations: &[(Fingerprint, Vec<Fingerprint>)],
) -> HashMap<Fingerprint, FamilyRelation> {
    let index: HashMap<&Fingerprint, usize> = declarations
        .iter()
        .enumerate()
        .map(|(i, (fp, _))| (fp, i))
        .collect();
    let n = declarations.len();

    // Directed declaration edges over arena indices. Targets outside the
    // population can't be mutual, so they only feed the alleged sets.
    let mut declares: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut external: Vec<Vec<Fingerprint>> = vec![Vec::new(); n];
    for (i, (fp, declared)) in declarations.iter().enumerate() {
        for target in declared {
            if target == fp {
                continue;
            }
            match index.get(target) {
                Some(&j) => {
                    declares[i].insert(j);
                }
                None => external[i].push(target.clone()),
            }
        }
    }

    // Mutual and one-way edges.
    let mut effective: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut alleged: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    for i in 0..n {
        for &j in &declares[i] {
            if declares[j].contains(&i) {
                effective[i].insert(j);
            } else {
                alleged[i].insert(j);
            }
        }
    }

    // One transitive hop through effective sets only. Alleged edges never
    // propagate, so a single bogus declaration can't poison unrelated
    // relays.
    let mut indirect: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    for i in 0..n {
        for &j in &effective[i] {
            for &k in &effective[j] {
                if k != i && !effective[i].contains(&k) {
                    indirect[i].insert(k);
                }
            }
        }
    }

    let resolved: HashMap<Fingerprint, FamilyRelation> = declarations
        .iter()
        .enumerate()
        .map(|(i, (fp, _))| {
            let to_fp = |set: &HashSet<usize>| {
                set.iter()
                    .map(|&j| declarations[j].0.clone())
                    .collect()
            };
            let mut relation = FamilyRelation {
                effective: to_fp(&effective[i]),
                alleged: to_fp(&alleged[i]),
                indirect: to_fp(&indirect[i]),
            };
            relation.alleged.extend(external[i].iter().cloned());
            (fp.clone(), relation)
        })
        .collect();

    let with_family = resolved.values().filter(|r| !r.is_empty()).count();
    debug!(
        "Resolved families: {} of {} relays related",
        with_family, n
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(c: char) -> Fingerprint {
        Fingerprint::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn declare(pairs: &[(char, &[char])]) -> Vec<(Fingerprint, Vec<Fingerprint>)> {
        pairs
            .iter()
            .map(|(c, targets)| (fp(*c), targets.iter().map(|t| fp(*t)).collect()))
            .collect()
    }

    #[test]
    fn test_mutual_oneway_mix() {
        // A declares [B, C]; B declares [A]; C declares nothing.
        let resolved = resolve_families(&declare(&[
            ('A', &['B', 'C']),
            ('B', &['A']),
            ('C', &[]),
        ]));

        let a = &resolved[&fp('A')];
        assert_eq!(a.effective, [fp('B')].into_iter().collect());
        assert_eq!(a.alleged, [fp('C')].into_iter().collect());

        let b = &resolved[&fp('B')];
        assert_eq!(b.effective, [fp('A')].into_iter().collect());

        let c = &resolved[&fp('C')];
        assert!(c.is_empty());
    }

    #[test]
    fn test_effective_is_symmetric() {
        let resolved = resolve_families(&declare(&[
            ('A', &['B', 'C']),
            ('B', &['A', 'C']),
            ('C', &['A', 'B']),
            ('D', &['A']),
        ]));

        for (fp_a, relation) in &resolved {
            for fp_b in &relation.effective {
                assert!(
                    resolved[fp_b].effective.contains(fp_a),
                    "effective not symmetric between {fp_a} and {fp_b}"
                );
            }
        }
    }

    #[test]
    fn test_sets_are_disjoint() {
        let resolved = resolve_families(&declare(&[
            ('A', &['B', 'D']),
            ('B', &['A', 'C']),
            ('C', &['B']),
            ('D', &[]),
        ]));

        for relation in resolved.values() {
            assert!(relation.effective.is_disjoint(&relation.alleged));
            assert!(relation.effective.is_disjoint(&relation.indirect));
        }
    }

    #[test]
    fn test_indirect_one_hop_through_effective() {
        // A<->B, B<->C: C is indirect for A (and vice versa).
        let resolved = resolve_families(&declare(&[
            ('A', &['B']),
            ('B', &['A', 'C']),
            ('C', &['B']),
        ]));

        assert_eq!(resolved[&fp('A')].indirect, [fp('C')].into_iter().collect());
        assert_eq!(resolved[&fp('C')].indirect, [fp('A')].into_iter().collect());
        assert!(resolved[&fp('B')].indirect.is_empty());
    }

    #[test]
    fn test_no_transitivity_through_alleged() {
        // A<->B mutual; B->C alleged only. C must not become indirect of A.
        let resolved = resolve_families(&declare(&[
            ('A', &['B']),
            ('B', &['A', 'C']),
            ('C', &[]),
        ]));

        assert!(resolved[&fp('A')].indirect.is_empty());
    }

    #[test]
    fn test_self_declaration_ignored() {
        let resolved = resolve_families(&declare(&[('A', &['A', 'B']), ('B', &['A'])]));
        let a = &resolved[&fp('A')];
        assert!(!a.effective.contains(&fp('A')));
        assert!(!a.alleged.contains(&fp('A')));
        assert_eq!(a.effective, [fp('B')].into_iter().collect());
    }

    #[test]
    fn test_declaration_to_unknown_relay_stays_alleged() {
        let resolved = resolve_families(&declare(&[('A', &['F'])]));
        assert_eq!(resolved[&fp('A')].alleged, [fp('F')].into_iter().collect());
    }

    #[test]
    fn test_zero_declarations_all_empty() {
        let resolved = resolve_families(&declare(&[('A', &[]), ('B', &[])]));
        assert!(resolved.values().all(|r| r.is_empty()));
    }
}
