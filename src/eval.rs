use crate::flag::Flag;
use crate::target::Target;

/// Global value of a flag: its boolean gate, or `false`.
pub fn evaluate(flag: &Flag) -> bool {
    flag.boolean_gate().is_some_and(|g| g.is_enabled())
}

/// Value of a flag for one item.
///
/// Precedence, highest first:
/// 1. an actor gate for the item's identity decides outright, either way
/// 2. any disabled gate for one of the item's groups gives `false`
/// 3. any enabled gate for one of the item's groups gives `true`
/// 4. otherwise the global value
///
/// Disabled groups are checked before enabled ones, so gate order inside the
/// flag never matters.
pub fn evaluate_for(flag: &Flag, target: &Target<'_>) -> bool {
    if let Some(actor_id) = target.actor_id() {
        if let Some(gate) = flag.actor_gate(&actor_id) {
            return gate.is_enabled();
        }
    }

    if let Some(groups) = target.groups() {
        let mut any_enabled = false;
        for gate in flag.group_gates() {
            let in_group = gate.subject().is_some_and(|s| groups.contains(s));
            if !in_group {
                continue;
            }
            if !gate.is_enabled() {
                return false;
            }
            any_enabled = true;
        }
        if any_enabled {
            return true;
        }
    }

    evaluate(flag)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::gate::Gate;
    use crate::target::{GroupMembership, Identity};

    struct User {
        id: u32,
        groups: Vec<&'static str>,
    }

    impl Identity for User {
        fn actor_id(&self) -> String {
            format!("user:{}", self.id)
        }
    }

    impl GroupMembership for User {
        fn groups(&self) -> HashSet<String> {
            self.groups.iter().map(|g| g.to_string()).collect()
        }
    }

    struct Team(&'static str);

    impl GroupMembership for Team {
        fn groups(&self) -> HashSet<String> {
            HashSet::from([self.0.to_string()])
        }
    }

    fn user(id: u32, groups: &[&'static str]) -> User {
        User {
            id,
            groups: groups.to_vec(),
        }
    }

    #[test]
    fn test_empty_flag_is_false_everywhere() {
        let flag = Flag::new("f");
        let u = user(1, &["a"]);
        assert!(!evaluate(&flag));
        assert!(!evaluate_for(&flag, &Target::of(&u)));
        assert!(!evaluate_for(&flag, &Target::none()));
    }

    #[test]
    fn test_boolean_gate() {
        let flag = Flag::with_gates("f", [Gate::boolean(true)]);
        assert!(evaluate(&flag));
        assert!(evaluate_for(&flag, &Target::of(&user(1, &[]))));

        let flag = Flag::with_gates("f", [Gate::boolean(false)]);
        assert!(!evaluate(&flag));
    }

    #[test]
    fn test_actor_gate_overrides_everything() {
        let u = user(7, &["staff"]);
        let flag = Flag::with_gates(
            "f",
            [
                Gate::boolean(false),
                Gate::group("staff", false).unwrap(),
                Gate::actor(&u, true).unwrap(),
            ],
        );
        assert!(evaluate_for(&flag, &Target::of(&u)));
        assert!(!evaluate(&flag));

        let flag = Flag::with_gates(
            "f",
            [
                Gate::actor(&u, false).unwrap(),
                Gate::boolean(true),
                Gate::group("staff", true).unwrap(),
            ],
        );
        assert!(!evaluate_for(&flag, &Target::of(&u)));
        assert!(evaluate_for(&flag, &Target::of(&user(8, &["staff"]))));
    }

    #[test]
    fn test_disabled_group_beats_enabled_group_in_any_order() {
        let u = user(1, &["g1", "g2"]);
        let enabled_first = Flag::with_gates(
            "f",
            [
                Gate::group("g1", true).unwrap(),
                Gate::group("g2", false).unwrap(),
            ],
        );
        let disabled_first = Flag::with_gates(
            "f",
            [
                Gate::group("g2", false).unwrap(),
                Gate::group("g1", true).unwrap(),
            ],
        );
        assert!(!evaluate_for(&enabled_first, &Target::of(&u)));
        assert!(!evaluate_for(&disabled_first, &Target::of(&u)));
    }

    #[test]
    fn test_disabled_group_beats_enabled_boolean() {
        let u = user(1, &["blocked"]);
        let flag = Flag::with_gates(
            "f",
            [Gate::boolean(true), Gate::group("blocked", false).unwrap()],
        );
        assert!(!evaluate_for(&flag, &Target::of(&u)));
        assert!(evaluate_for(&flag, &Target::of(&user(2, &["other"]))));
    }

    #[test]
    fn test_enabled_group_beats_disabled_boolean() {
        let u = user(1, &["g"]);
        let flag = Flag::with_gates("f", [Gate::boolean(false), Gate::group("g", true).unwrap()]);
        assert!(evaluate_for(&flag, &Target::of(&u)));
        assert!(!evaluate(&flag));
    }

    #[test]
    fn test_fallback_to_boolean_without_matches() {
        let u = user(1, &["x"]);
        let flag = Flag::with_gates(
            "f",
            [
                Gate::boolean(true),
                Gate::group("y", false).unwrap(),
                Gate::actor(&user(2, &[]), false).unwrap(),
            ],
        );
        assert!(evaluate_for(&flag, &Target::of(&u)));
    }

    #[test]
    fn test_missing_capabilities_degrade() {
        let team = Team("g");
        let flag = Flag::with_gates("f", [Gate::group("g", true).unwrap()]);
        assert!(evaluate_for(&flag, &Target::member(&team)));

        // identity only: group gates are never consulted
        let u = user(1, &["g"]);
        assert!(!evaluate_for(&flag, &Target::actor(&u)));
        assert!(evaluate_for(&flag, &Target::actor(&u).with_membership(&u)));
    }
}
